//! Port and runtime dependency bundles for the story pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{
    AudioSynthesisProvider, ChildProfileRepository, GenerationAttemptRepository,
    ModerationProvider, StoryRepository, TextGenerationProvider,
};

use super::{BackoffJitter, PipelineSleeper};

/// Port bundle required by the story pipeline.
pub struct StoryPipelinePorts {
    /// Child profile lookup.
    pub profiles: Arc<dyn ChildProfileRepository>,
    /// Attempt persistence and leasing.
    pub attempts: Arc<dyn GenerationAttemptRepository>,
    /// Story persistence.
    pub stories: Arc<dyn StoryRepository>,
    /// Outbound text generation adapter.
    pub text: Arc<dyn TextGenerationProvider>,
    /// Outbound moderation adapter.
    pub moderation: Arc<dyn ModerationProvider>,
    /// Outbound audio synthesis adapter.
    pub audio: Arc<dyn AudioSynthesisProvider>,
}

impl StoryPipelinePorts {
    /// Build a strongly-typed pipeline port bundle.
    pub fn new(
        profiles: Arc<dyn ChildProfileRepository>,
        attempts: Arc<dyn GenerationAttemptRepository>,
        stories: Arc<dyn StoryRepository>,
        text: Arc<dyn TextGenerationProvider>,
        moderation: Arc<dyn ModerationProvider>,
        audio: Arc<dyn AudioSynthesisProvider>,
    ) -> Self {
        Self {
            profiles,
            attempts,
            stories,
            text,
            moderation,
            audio,
        }
    }
}

/// Runtime helpers used by the retry policy.
pub struct StoryPipelineRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn PipelineSleeper>,
    /// Jitter strategy for retry delays.
    pub jitter: Arc<dyn BackoffJitter>,
}

impl Default for StoryPipelineRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(AttemptJitter),
        }
    }
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl PipelineSleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Default jitter: adds up to a quarter of the base delay, seeded from the
/// clock's sub-second nanos.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptJitter;

impl BackoffJitter for AttemptJitter {
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = (base_ms / 4).max(1);
        let seed = u64::from(now.timestamp_subsec_nanos()) ^ u64::from(attempt);
        let extra = seed % max_extra.saturating_add(1);
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(123_456_789)]
    #[case(999_999_999)]
    fn attempt_jitter_stays_within_a_quarter_of_base(#[case] nanos: u32) {
        let now = Utc
            .timestamp_opt(1_772_000_000, nanos)
            .single()
            .expect("valid timestamp");
        let delay = AttemptJitter.jittered_delay(Duration::from_millis(400), 2, now);
        assert!(delay >= Duration::from_millis(400));
        assert!(delay <= Duration::from_millis(500));
    }
}
