//! Deterministic word-list moderator usable without a remote provider.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::SafetyVerdict;
use crate::domain::ports::{ModerationError, ModerationProvider};

/// Version tag of the built-in word list.
pub const KEYWORD_LIST_VERSION: &str = "2026-10";

const DEFAULT_KEYWORDS: &[(&str, &str)] = &[
    ("blood", "violence"),
    ("gun", "violence"),
    ("kill", "violence"),
    ("knife", "violence"),
    ("knives", "violence"),
    ("murder", "violence"),
    ("stab", "violence"),
    ("weapon", "violence"),
    ("corpse", "graphic"),
    ("gore", "graphic"),
    ("terrify", "fear"),
    ("nightmare", "fear"),
    ("beer", "adult"),
    ("drunk", "adult"),
    ("wine", "adult"),
];

/// Endings stripped to reach a listed base word. Longer endings come first.
const INFLECTION_SUFFIXES: &[&str] = &[
    "ings", "ing", "ers", "ied", "ies", "er", "ed", "es", "en", "ly", "d", "s", "y",
];

const MIN_STEM_CHARS: usize = 3;

/// Flags text containing any listed word or a regular inflection of one
/// ("killed", "guns", "bloody"), case-insensitively and on word boundaries.
/// The same text always yields the same verdict.
#[derive(Debug, Clone)]
pub struct KeywordModerationProvider {
    keywords: BTreeMap<String, String>,
}

impl Default for KeywordModerationProvider {
    fn default() -> Self {
        Self::with_keywords(
            DEFAULT_KEYWORDS
                .iter()
                .map(|(word, code)| ((*word).to_owned(), (*code).to_owned())),
        )
    }
}

impl KeywordModerationProvider {
    /// Build a moderator from `(word, reason_code)` pairs.
    pub fn with_keywords<I>(keywords: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|(word, code)| (word.to_lowercase(), code))
                .collect(),
        }
    }

    /// Classify `text` without any I/O.
    pub fn classify(&self, text: &str) -> SafetyVerdict {
        let codes: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .filter_map(|word| {
                base_forms(&word.to_lowercase())
                    .iter()
                    .find_map(|form| self.keywords.get(form))
            })
            .map(String::as_str)
            .collect();
        if codes.is_empty() {
            SafetyVerdict::safe()
        } else {
            SafetyVerdict::unsafe_with(codes)
        }
    }
}

/// The word itself followed by the forms reached by peeling off up to two
/// inflection endings.
fn base_forms(word: &str) -> Vec<String> {
    let mut forms = vec![word.to_owned()];
    let mut frontier = vec![word.to_owned()];
    for _ in 0..2 {
        let mut next = Vec::new();
        for form in &frontier {
            for stem in strip_inflection(form) {
                if !forms.contains(&stem) {
                    forms.push(stem.clone());
                    next.push(stem);
                }
            }
        }
        frontier = next;
    }
    forms
}

fn strip_inflection(word: &str) -> Vec<String> {
    let mut stems = Vec::new();
    for suffix in INFLECTION_SUFFIXES {
        let Some(stem) = word.strip_suffix(suffix) else {
            continue;
        };
        if stem.chars().count() < MIN_STEM_CHARS {
            continue;
        }
        if suffix.starts_with('i') {
            // "terrified" -> "terrify"
            stems.push(format!("{stem}y"));
        }
        stems.push(stem.to_owned());
        if let Some(undoubled) = undouble(stem) {
            // "stabbed" -> "stab"
            stems.push(undoubled);
        }
    }
    stems
}

fn undouble(stem: &str) -> Option<String> {
    let mut chars = stem.chars().rev();
    let last = chars.next()?;
    let before = chars.next()?;
    (last == before && !"aeiou".contains(last)).then(|| {
        let mut shorter = stem.to_owned();
        shorter.pop();
        shorter
    })
}

#[async_trait]
impl ModerationProvider for KeywordModerationProvider {
    async fn moderate(
        &self,
        text: &str,
        _timeout: Duration,
    ) -> Result<SafetyVerdict, ModerationError> {
        Ok(self.classify(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("The bunny hopped home and fell asleep.", &[])]
    #[case("A KNIFE glinted in the dark.", &["violence"])]
    #[case("The nightmare had blood in it.", &["fear", "violence"])]
    #[case("Skillful knights guarded the castle.", &[])]
    fn classifies_on_word_boundaries(#[case] text: &str, #[case] codes: &[&str]) {
        let verdict = KeywordModerationProvider::default().classify(text);
        assert_eq!(verdict.safe, codes.is_empty());
        let actual: Vec<&str> = verdict.reason_codes.iter().map(String::as_str).collect();
        assert_eq!(actual, codes);
    }

    #[rstest]
    #[case("killed")]
    #[case("killing")]
    #[case("killer")]
    #[case("knives")]
    #[case("guns")]
    #[case("gunned")]
    #[case("murdering")]
    #[case("murderers")]
    #[case("bloody")]
    #[case("nightmares")]
    #[case("terrified")]
    #[case("terrifying")]
    #[case("stabbed")]
    #[case("drunken")]
    fn inflected_forms_are_flagged(#[case] word: &str) {
        let verdict = KeywordModerationProvider::default().classify(&format!("Then {word}."));
        assert!(!verdict.safe, "{word} should be flagged");
    }

    #[test]
    fn violent_sentence_with_only_inflections_is_unsafe() {
        let verdict = KeywordModerationProvider::default().classify(
            "The man killed the dog with knives and guns, murdering everyone in bloody nightmares.",
        );
        assert!(!verdict.safe);
        let actual: Vec<&str> = verdict.reason_codes.iter().map(String::as_str).collect();
        assert_eq!(actual, ["fear", "violence"]);
    }

    #[rstest]
    #[case("A terrific day at the seaside.")]
    #[case("The bloodhound sniffed the garden.")]
    #[case("Grandma visited the winery's duck pond.")]
    #[case("Gorgeous gulls glided over the gunwale.")]
    fn near_misses_stay_safe(#[case] text: &str) {
        assert!(KeywordModerationProvider::default().classify(text).safe, "{text}");
    }

    #[test]
    fn custom_lists_replace_the_defaults() {
        let moderator =
            KeywordModerationProvider::with_keywords([("dragon".to_owned(), "fear".to_owned())]);
        assert!(!moderator.classify("A dragon!").safe);
        assert!(moderator.classify("A knife.").safe);
    }
}
