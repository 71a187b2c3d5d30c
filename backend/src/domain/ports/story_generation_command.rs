//! Driving port for submitting story generation requests.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::domain::{
    ApprovedText, AttemptId, AttemptState, AudioResult, ChildId, ChildProfile, Error,
    FailureReason, GeneratedText, GenerationAttempt, GenerationRequest, PipelineStage,
    PromptDetails, RequestId, SafetyVerdict, Story, SubmissionFingerprint, UserId,
    VoicePreference,
};

/// A caller's request to generate one story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitStoryRequest {
    /// Idempotency key.
    pub request_id: RequestId,
    pub owner_id: UserId,
    pub child_id: ChildId,
    pub prompt_details: PromptDetails,
    pub voice: VoicePreference,
}

impl SubmitStoryRequest {
    /// Inputs compared when the request id is seen again.
    pub fn fingerprint(&self) -> SubmissionFingerprint<'_> {
        SubmissionFingerprint {
            child_id: &self.child_id,
            prompt_details: &self.prompt_details,
            voice: &self.voice,
        }
    }
}

/// Caller-facing status of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Another run owns the request id, or the attempt has not finished.
    InProgress,
    Succeeded,
    /// Moderation rejected the generated text. Terminal.
    Unsafe,
    Failed,
}

/// Result of a submission or status lookup.
///
/// `reason` is a fixed human-readable phrase; raw provider errors stay on the
/// attempt record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    #[schema(value_type = String, format = Uuid)]
    pub request_id: RequestId,
    pub status: GenerationStatus,
    /// Current stage when in progress, or the stage that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Whether resubmitting the same request id may resume the attempt.
    pub retryable: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reason_codes: Vec<String>,
    /// Number of runs that have worked on the attempt.
    pub runs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<Story>,
}

impl GenerationOutcome {
    /// Describe the current state of `attempt`.
    pub fn from_attempt(attempt: &GenerationAttempt, story: Option<Story>) -> Self {
        let base = Self {
            request_id: attempt.request_id().clone(),
            status: GenerationStatus::InProgress,
            stage: None,
            failure_reason: None,
            retryable: false,
            reason: String::new(),
            reason_codes: Vec::new(),
            runs: attempt.runs,
            story: None,
        };
        match &attempt.state {
            AttemptState::Active(stage) => Self {
                stage: Some(*stage),
                reason: format!("story generation is in progress ({stage})"),
                ..base
            },
            AttemptState::Succeeded { .. } => Self {
                status: GenerationStatus::Succeeded,
                reason: "story generated".to_owned(),
                story,
                ..base
            },
            AttemptState::Unsafe { reason_codes } => Self {
                status: GenerationStatus::Unsafe,
                stage: Some(PipelineStage::Moderating),
                reason: "generated story did not pass safety moderation".to_owned(),
                reason_codes: reason_codes.clone(),
                ..base
            },
            AttemptState::Failed(failure) => Self {
                status: GenerationStatus::Failed,
                stage: Some(failure.stage),
                failure_reason: Some(failure.reason),
                retryable: failure.retryable,
                reason: describe_failure(failure.reason).to_owned(),
                ..base
            },
        }
    }

    /// Outcome for a duplicate submission observed while another run holds
    /// the request id.
    pub fn attempt_in_progress(attempt: &GenerationAttempt) -> Self {
        let stage = match &attempt.state {
            AttemptState::Active(stage) => Some(*stage),
            AttemptState::Failed(failure) => Some(failure.stage),
            _ => None,
        };
        Self {
            request_id: attempt.request_id().clone(),
            status: GenerationStatus::InProgress,
            stage,
            failure_reason: None,
            retryable: false,
            reason: "another run is already generating this story; poll for status".to_owned(),
            reason_codes: Vec::new(),
            runs: attempt.runs,
            story: None,
        }
    }
}

impl GenerationOutcome {
    /// Outcome for a duplicate that arrived before the first run stored its
    /// attempt record.
    pub fn pending(request_id: RequestId) -> Self {
        Self {
            request_id,
            status: GenerationStatus::InProgress,
            stage: Some(PipelineStage::Created),
            failure_reason: None,
            retryable: false,
            reason: "another run is already generating this story; poll for status".to_owned(),
            reason_codes: Vec::new(),
            runs: 0,
            story: None,
        }
    }
}

fn describe_failure(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::InvalidInput => "the request did not contain any story details",
        FailureReason::ProviderTimeout => "a story provider did not respond in time",
        FailureReason::ProviderRateLimited => "a story provider is busy; try again shortly",
        FailureReason::ProviderUnavailable => "a story provider is temporarily unavailable",
        FailureReason::ProviderRejected => "a story provider refused the request",
        FailureReason::ProviderMalformedOutput => "a story provider returned an unusable response",
        FailureReason::ModerationUnavailable => {
            "the safety check could not be completed, so the story was withheld"
        }
        FailureReason::PersistenceFailure => "the finished story could not be saved",
        FailureReason::Cancelled => "story generation was cancelled",
    }
}

/// Driving port for story generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoryGenerationCommand: Send + Sync {
    /// Run, resume, or replay the pipeline for `request.request_id`.
    ///
    /// Stage failures are reported through the outcome. `Err` is reserved for
    /// caller errors (unknown child, foreign request id, payload mismatch) and
    /// unavailable attempt storage.
    async fn submit(
        &self,
        request: SubmitStoryRequest,
        cancellation: CancellationToken,
    ) -> Result<GenerationOutcome, Error>;
}

/// Fixture command that reports an immediately succeeded story.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureStoryGenerationCommand;

#[async_trait]
impl StoryGenerationCommand for FixtureStoryGenerationCommand {
    async fn submit(
        &self,
        request: SubmitStoryRequest,
        _cancellation: CancellationToken,
    ) -> Result<GenerationOutcome, Error> {
        let generation = GenerationRequest::new(
            request.request_id.clone(),
            request.owner_id,
            request.child_id,
            ChildProfile::default(),
            request.prompt_details,
            request.voice,
        );
        let text = ApprovedText::from_verdict(
            GeneratedText {
                text: "Goodnight, little one.".to_owned(),
                token_count: 3,
            },
            &SafetyVerdict::safe(),
        )
        .ok_or_else(|| Error::internal("fixture verdict must approve text"))?;
        let story = Story::compose(
            &generation,
            AttemptId::random(),
            "A Bedtime Story",
            text,
            AudioResult {
                reference: "audio://fixture".to_owned(),
                duration_seconds: Some(2),
            },
            Utc::now(),
        );
        Ok(GenerationOutcome {
            request_id: request.request_id,
            status: GenerationStatus::Succeeded,
            stage: None,
            failure_reason: None,
            retryable: false,
            reason: "story generated".to_owned(),
            reason_codes: Vec::new(),
            runs: 1,
            story: Some(story),
        })
    }
}
