//! Driven port for classifying generated text as safe or unsafe.

use std::time::Duration;

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::SafetyVerdict;

define_port_error! {
    /// Errors surfaced while moderating text.
    ///
    /// Both variants leave the verdict indeterminate, so the pipeline fails
    /// closed.
    pub enum ModerationError {
        /// The moderation provider could not be reached or errored.
        Unavailable { message: String } =>
            "moderation unavailable: {message}",
        /// The moderation call exceeded its timeout.
        Timeout { message: String } =>
            "moderation timed out: {message}",
    }
}

/// Port for content safety classification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// Classify `text`. The same text and moderator version yield the same
    /// verdict.
    async fn moderate(&self, text: &str, timeout: Duration)
    -> Result<SafetyVerdict, ModerationError>;
}

/// Fixture moderator that approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureModerationProvider;

#[async_trait]
impl ModerationProvider for FixtureModerationProvider {
    async fn moderate(
        &self,
        _text: &str,
        _timeout: Duration,
    ) -> Result<SafetyVerdict, ModerationError> {
        Ok(SafetyVerdict::safe())
    }
}
