//! Driven port for the external text generation provider.

use std::time::Duration;

use async_trait::async_trait;

use super::ProviderError;
use crate::domain::{GeneratedText, GenerationPayload, count_words};

/// Port for generating story text from a prompt payload.
///
/// Every call is billable. Implementations must make exactly one provider
/// call per invocation and never retry internally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerationProvider: Send + Sync {
    /// Generate story text for `payload`, giving up after `timeout`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use std::time::Duration;
    ///
    /// let provider = FixtureTextGenerationProvider;
    /// let text = provider.generate(&payload, Duration::from_secs(30)).await?;
    /// assert!(!text.text.is_empty());
    /// ```
    async fn generate(
        &self,
        payload: &GenerationPayload,
        timeout: Duration,
    ) -> Result<GeneratedText, ProviderError>;
}

/// Fixture provider returning a short canned story.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureTextGenerationProvider;

#[async_trait]
impl TextGenerationProvider for FixtureTextGenerationProvider {
    async fn generate(
        &self,
        payload: &GenerationPayload,
        _timeout: Duration,
    ) -> Result<GeneratedText, ProviderError> {
        let text = format!(
            "{}. The moon rose softly over the hills, and everyone drifted off to sleep.",
            payload.title
        );
        let token_count = count_words(&text);
        Ok(GeneratedText { text, token_count })
    }
}
