//! Values produced by the text, moderation, and audio stages.
//!
//! These are checkpointed on the attempt record so a resumed run can skip
//! stages that already completed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Raw story text returned by the text generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedText {
    pub text: String,
    /// Provider-reported token or word count.
    pub token_count: u32,
}

/// Moderation classification of generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyVerdict {
    pub safe: bool,
    #[serde(default)]
    pub reason_codes: BTreeSet<String>,
}

impl SafetyVerdict {
    /// A verdict with no findings.
    pub fn safe() -> Self {
        Self {
            safe: true,
            reason_codes: BTreeSet::new(),
        }
    }

    /// An unsafe verdict carrying the supplied reason codes.
    pub fn unsafe_with<I, S>(reason_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            safe: false,
            reason_codes: reason_codes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Durable reference to narrated audio plus duration metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioResult {
    /// URL or handle resolvable to playable audio out of band.
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
}

/// Text that a moderator explicitly classified as safe.
///
/// Only obtainable through [`ApprovedText::from_verdict`], so audio synthesis
/// and story persistence cannot be reached with unmoderated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedText(GeneratedText);

impl ApprovedText {
    /// Pair text with its verdict, returning `None` unless the verdict is safe.
    pub fn from_verdict(text: GeneratedText, verdict: &SafetyVerdict) -> Option<Self> {
        verdict.safe.then_some(Self(text))
    }

    /// Borrow the approved story text.
    pub fn text(&self) -> &str {
        self.0.text.as_str()
    }

    /// Consume the wrapper.
    pub fn into_inner(self) -> GeneratedText {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn text() -> GeneratedText {
        GeneratedText {
            text: "Once upon a time".to_owned(),
            token_count: 4,
        }
    }

    #[rstest]
    fn approval_requires_safe_verdict() {
        assert!(ApprovedText::from_verdict(text(), &SafetyVerdict::safe()).is_some());
        assert!(
            ApprovedText::from_verdict(text(), &SafetyVerdict::unsafe_with(["violence"]))
                .is_none()
        );
    }
}
