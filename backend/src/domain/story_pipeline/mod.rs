//! Story generation pipeline coordinator.
//!
//! The coordinator owns admission (payload fingerprint checks, in-process
//! exclusion, and the attempt lease), stage sequencing with checkpointed
//! resumption, the retry policy (jittered exponential backoff), and the
//! atomic story commit. Stage failures become attempt states; only caller
//! and storage errors leave as [`Error`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::ports::{
    AudioSynthesisProvider, ChildProfileRepository, GenerationAttemptRepository,
    GenerationOutcome, ModerationProvider, StoryGenerationCommand, StoryGenerationQuery,
    StoryRepository, SubmitStoryRequest, TextGenerationProvider,
};
use crate::domain::{
    AttemptState, Error, GenerationAttempt, GenerationRequest, PayloadHash, RequestId, Story,
    StoryId, UserId, build_prompt,
};

mod in_flight;
mod mapping;
mod retry;
mod run;
mod runtime;

use in_flight::InFlightRequests;
use run::RunContext;
pub use runtime::{AttemptJitter, StoryPipelinePorts, StoryPipelineRuntime, TokioSleeper};

/// Pipeline configuration controlling retries, timeouts, and leases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPipelineConfig {
    /// Maximum calls per stage within one run (including the first call).
    pub max_attempts: u32,
    /// Initial retry backoff.
    pub initial_backoff: Duration,
    /// Maximum retry backoff cap.
    pub max_backoff: Duration,
    /// Timeout applied to every provider call.
    pub provider_timeout: Duration,
    /// How long a run owns an attempt without checkpointing.
    pub lease_duration: Duration,
}

impl StoryPipelineConfig {
    /// Longest one retried stage can run: every call hits the timeout and
    /// every backoff hits the cap plus the full default jitter.
    ///
    /// ```rust
    /// use lullaby_backend::domain::StoryPipelineConfig;
    /// use std::time::Duration;
    ///
    /// let config = StoryPipelineConfig::default();
    /// assert_eq!(config.worst_case_stage_duration(), Duration::from_secs(100));
    /// assert!(config.worst_case_stage_duration() < config.lease_duration);
    /// ```
    pub fn worst_case_stage_duration(&self) -> Duration {
        let calls = self.max_attempts.max(1);
        let backoff = self.max_backoff.saturating_add(self.max_backoff / 4);
        self.provider_timeout
            .saturating_mul(calls)
            .saturating_add(backoff.saturating_mul(calls - 1))
    }
}

impl Default for StoryPipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
            provider_timeout: Duration::from_secs(30),
            lease_duration: Duration::from_secs(300),
        }
    }
}

/// Async clock-independent sleeping abstraction for retries.
#[async_trait]
pub trait PipelineSleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    ///
    /// ```rust
    /// use lullaby_backend::domain::BackoffJitter;
    /// use chrono::{TimeZone, Utc};
    /// use std::time::Duration;
    /// struct FixedJitter;
    /// impl BackoffJitter for FixedJitter {
    ///     fn jittered_delay(&self, base: Duration, attempt: u32, _now: chrono::DateTime<Utc>) -> Duration {
    ///         base + Duration::from_millis(u64::from(attempt) * 5)
    ///     }
    /// }
    /// let now = Utc.with_ymd_and_hms(2026, 3, 1, 19, 0, 0).single().expect("valid time");
    /// let delay = FixedJitter.jittered_delay(Duration::from_millis(500), 2, now);
    /// assert_eq!(delay, Duration::from_millis(510));
    /// ```
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Domain-owned story generation coordinator.
pub struct StoryPipeline {
    profiles: Arc<dyn ChildProfileRepository>,
    attempts: Arc<dyn GenerationAttemptRepository>,
    stories: Arc<dyn StoryRepository>,
    text: Arc<dyn TextGenerationProvider>,
    moderation: Arc<dyn ModerationProvider>,
    audio: Arc<dyn AudioSynthesisProvider>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn PipelineSleeper>,
    jitter: Arc<dyn BackoffJitter>,
    in_flight: InFlightRequests,
    config: StoryPipelineConfig,
}

impl StoryPipeline {
    /// Build a pipeline using default runtime dependencies.
    /// ```rust,ignore
    /// let pipeline = StoryPipeline::new(ports, clock, StoryPipelineConfig::default());
    /// ```
    pub fn new(
        ports: StoryPipelinePorts,
        clock: Arc<dyn Clock>,
        config: StoryPipelineConfig,
    ) -> Self {
        Self::with_runtime(ports, clock, StoryPipelineRuntime::default(), config)
    }

    /// Build a pipeline with injected runtime abstractions.
    pub fn with_runtime(
        ports: StoryPipelinePorts,
        clock: Arc<dyn Clock>,
        runtime: StoryPipelineRuntime,
        config: StoryPipelineConfig,
    ) -> Self {
        Self {
            profiles: ports.profiles,
            attempts: ports.attempts,
            stories: ports.stories,
            text: ports.text,
            moderation: ports.moderation,
            audio: ports.audio,
            clock,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            in_flight: InFlightRequests::default(),
            config,
        }
    }

    /// Run, resume, or replay the pipeline for one submission.
    ///
    /// ```rust,ignore
    /// let outcome = pipeline.process(request, CancellationToken::new()).await?;
    /// ```
    pub async fn process(
        &self,
        request: SubmitStoryRequest,
        cancellation: CancellationToken,
    ) -> Result<GenerationOutcome, Error> {
        let payload_hash = request
            .fingerprint()
            .hash()
            .map_err(|err| Error::internal(format!("failed to fingerprint request: {err}")))?;

        let Some(_guard) = self
            .in_flight
            .try_claim(&request.request_id)
            .map_err(Error::internal)?
        else {
            debug!(request_id = %request.request_id, "duplicate submission while run is active");
            return self.in_progress_outcome(&request).await;
        };

        let attempt = match self
            .attempts
            .find_by_request(&request.request_id)
            .await
            .map_err(mapping::map_attempt_error)?
        {
            Some(existing) => existing,
            None => self.create_attempt(&request, payload_hash.clone()).await?,
        };

        if attempt.request.owner_id() != &request.owner_id {
            return Err(Error::conflict(format!(
                "request id {} is already in use",
                request.request_id
            )));
        }
        if attempt.payload_hash != payload_hash {
            return Err(Error::conflict(format!(
                "request id {} was already submitted with a different payload",
                request.request_id
            ))
            .with_details(serde_json::json!({ "requestId": request.request_id })));
        }
        if attempt.state.is_terminal() {
            info!(
                request_id = %request.request_id,
                attempt_id = %attempt.id,
                status = attempt.state.status_name(),
                "replaying terminal attempt outcome"
            );
            return self.describe(&attempt).await;
        }

        let now = self.clock.utc();
        let Some(leased) = self
            .attempts
            .acquire_lease(&attempt.id, now, self.lease_until(now))
            .await
            .map_err(mapping::map_attempt_error)?
        else {
            debug!(
                request_id = %request.request_id,
                attempt_id = %attempt.id,
                "attempt lease held by another run"
            );
            return Ok(GenerationOutcome::attempt_in_progress(&attempt));
        };
        if leased.state.is_terminal() {
            // Another run closed the attempt between the read and the lease.
            self.release(&leased).await;
            return self.describe(&leased).await;
        }

        Ok(self.run(leased, &cancellation).await)
    }

    async fn create_attempt(
        &self,
        request: &SubmitStoryRequest,
        payload_hash: PayloadHash,
    ) -> Result<GenerationAttempt, Error> {
        let profile = self
            .profiles
            .get_child_profile(&request.child_id, &request.owner_id)
            .await
            .map_err(mapping::map_profile_error)?;
        // Reject empty narratives before the request id is bound to an attempt.
        build_prompt(&profile, &request.prompt_details)
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        let generation = GenerationRequest::new(
            request.request_id.clone(),
            request.owner_id.clone(),
            request.child_id.clone(),
            profile,
            request.prompt_details.clone(),
            request.voice.clone(),
        );
        let fresh = GenerationAttempt::create(generation, payload_hash, self.clock.utc());
        let stored = self
            .attempts
            .insert_if_absent(&fresh)
            .await
            .map_err(mapping::map_attempt_error)?;
        if stored.id == fresh.id {
            info!(
                request_id = %request.request_id,
                attempt_id = %stored.id,
                payload_hash = %stored.payload_hash,
                "created generation attempt"
            );
        }
        Ok(stored)
    }

    async fn in_progress_outcome(
        &self,
        request: &SubmitStoryRequest,
    ) -> Result<GenerationOutcome, Error> {
        let attempt = self
            .attempts
            .find_by_request(&request.request_id)
            .await
            .map_err(mapping::map_attempt_error)?;
        Ok(match attempt {
            Some(attempt) => GenerationOutcome::attempt_in_progress(&attempt),
            None => GenerationOutcome::pending(request.request_id.clone()),
        })
    }

    async fn describe(&self, attempt: &GenerationAttempt) -> Result<GenerationOutcome, Error> {
        let story = match &attempt.state {
            AttemptState::Succeeded { .. } => self
                .stories
                .find_by_request(attempt.request_id())
                .await
                .map_err(mapping::map_story_error)?,
            _ => None,
        };
        Ok(GenerationOutcome::from_attempt(attempt, story))
    }

    async fn release(&self, attempt: &GenerationAttempt) {
        if let Err(error) = self.attempts.close_attempt(attempt).await {
            warn!(attempt_id = %attempt.id, %error, "failed to release attempt lease");
        }
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.config.lease_duration)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Current status of an attempt owned by `owner`.
    pub async fn attempt_status(
        &self,
        owner: &UserId,
        request_id: &RequestId,
    ) -> Result<GenerationOutcome, Error> {
        let attempt = self
            .attempts
            .find_by_request(request_id)
            .await
            .map_err(mapping::map_attempt_error)?
            .filter(|attempt| attempt.request.owner_id() == owner)
            .ok_or_else(|| {
                Error::not_found(format!("no story generation for request {request_id}"))
            })?;
        self.describe(&attempt).await
    }

    /// Load a story owned by `owner`.
    pub async fn story(&self, owner: &UserId, story_id: &StoryId) -> Result<Story, Error> {
        self.stories
            .find_by_id(story_id)
            .await
            .map_err(mapping::map_story_error)?
            .filter(|story| story.owner_id() == owner)
            .ok_or_else(|| Error::not_found(format!("story {story_id} not found")))
    }

    /// Stories owned by `owner`, newest first.
    pub async fn stories_for(&self, owner: &UserId) -> Result<Vec<Story>, Error> {
        self.stories
            .list_by_owner(owner)
            .await
            .map_err(mapping::map_story_error)
    }
}

#[async_trait]
impl StoryGenerationCommand for StoryPipeline {
    async fn submit(
        &self,
        request: SubmitStoryRequest,
        cancellation: CancellationToken,
    ) -> Result<GenerationOutcome, Error> {
        self.process(request, cancellation).await
    }
}

#[async_trait]
impl StoryGenerationQuery for StoryPipeline {
    async fn attempt_status(
        &self,
        owner: &UserId,
        request_id: &RequestId,
    ) -> Result<GenerationOutcome, Error> {
        StoryPipeline::attempt_status(self, owner, request_id).await
    }

    async fn get_story(&self, owner: &UserId, story_id: &StoryId) -> Result<Story, Error> {
        self.story(owner, story_id).await
    }

    async fn list_stories(&self, owner: &UserId) -> Result<Vec<Story>, Error> {
        self.stories_for(owner).await
    }
}
