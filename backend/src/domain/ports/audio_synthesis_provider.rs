//! Driven port for narrating approved story text.

use std::time::Duration;

use async_trait::async_trait;

use super::ProviderError;
use crate::domain::{AudioResult, VoicePreference};

/// Port for converting text into narrated audio.
///
/// Implementations return a durable reference rather than raw bytes. The
/// caller, not the adapter, decides whether a call may be repeated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSynthesisProvider: Send + Sync {
    /// Narrate `text` with the requested voice, giving up after `timeout`.
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoicePreference,
        timeout: Duration,
    ) -> Result<AudioResult, ProviderError>;
}

/// Fixture provider returning a deterministic reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureAudioSynthesisProvider;

#[async_trait]
impl AudioSynthesisProvider for FixtureAudioSynthesisProvider {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoicePreference,
        _timeout: Duration,
    ) -> Result<AudioResult, ProviderError> {
        let voice = voice.voice_id.as_deref().unwrap_or("default");
        Ok(AudioResult {
            reference: format!("audio://fixture/{voice}/{}", text.len()),
            duration_seconds: None,
        })
    }
}
