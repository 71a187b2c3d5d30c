//! Generation attempt records and the pipeline state machine.
//!
//! One attempt exists per request id. Each submission that resumes the
//! attempt increments `runs`, and stage outputs are checkpointed so a resumed
//! run starts at the stage that previously failed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    AttemptId, AudioResult, GeneratedText, GenerationRequest, PayloadHash, RequestId,
    SafetyVerdict, StoryId,
};

/// Ordered pipeline stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Created,
    Building,
    Generating,
    Moderating,
    Synthesizing,
    Persisting,
}

impl PipelineStage {
    /// Stable storage and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Building => "building",
            Self::Generating => "generating",
            Self::Moderating => "moderating",
            Self::Synthesizing => "synthesizing",
            Self::Persisting => "persisting",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown stage or failure reason name read from storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attempt state name `{0}`")]
pub struct UnknownStateName(pub String);

impl FromStr for PipelineStage {
    type Err = UnknownStateName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(Self::Created),
            "building" => Ok(Self::Building),
            "generating" => Ok(Self::Generating),
            "moderating" => Ok(Self::Moderating),
            "synthesizing" => Ok(Self::Synthesizing),
            "persisting" => Ok(Self::Persisting),
            other => Err(UnknownStateName(other.to_owned())),
        }
    }
}

/// Categorised cause of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidInput,
    ProviderTimeout,
    ProviderRateLimited,
    ProviderUnavailable,
    ProviderRejected,
    ProviderMalformedOutput,
    ModerationUnavailable,
    PersistenceFailure,
    Cancelled,
}

impl FailureReason {
    /// Stable storage and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::ProviderTimeout => "provider_timeout",
            Self::ProviderRateLimited => "provider_rate_limited",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::ProviderRejected => "provider_rejected",
            Self::ProviderMalformedOutput => "provider_malformed_output",
            Self::ModerationUnavailable => "moderation_unavailable",
            Self::PersistenceFailure => "persistence_failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for FailureReason {
    type Err = UnknownStateName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "invalid_input" => Ok(Self::InvalidInput),
            "provider_timeout" => Ok(Self::ProviderTimeout),
            "provider_rate_limited" => Ok(Self::ProviderRateLimited),
            "provider_unavailable" => Ok(Self::ProviderUnavailable),
            "provider_rejected" => Ok(Self::ProviderRejected),
            "provider_malformed_output" => Ok(Self::ProviderMalformedOutput),
            "moderation_unavailable" => Ok(Self::ModerationUnavailable),
            "persistence_failure" => Ok(Self::PersistenceFailure),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStateName(other.to_owned())),
        }
    }
}

/// Failure details recorded on an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFailure {
    pub stage: PipelineStage,
    pub reason: FailureReason,
    /// Whether resubmitting the request id may resume the attempt.
    pub retryable: bool,
    /// Number of calls made at `stage` during the failing run.
    pub calls: u32,
    pub message: String,
}

impl AttemptFailure {
    /// Whether the run exhausted its retry budget at `stage`.
    pub fn retries_exhausted(&self, max_attempts: u32) -> bool {
        self.retryable && self.calls >= max_attempts
    }
}

/// Current state of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    /// Non-terminal: the last stage entered.
    Active(PipelineStage),
    Succeeded { story_id: StoryId },
    Unsafe { reason_codes: Vec<String> },
    Failed(AttemptFailure),
}

impl AttemptState {
    /// Whether no further transition may occur for this request id.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Active(_) => false,
            Self::Succeeded { .. } | Self::Unsafe { .. } => true,
            Self::Failed(failure) => !failure.retryable,
        }
    }

    /// Stable name used for the status column.
    pub fn status_name(&self) -> &'static str {
        match self {
            Self::Active(stage) => stage.as_str(),
            Self::Succeeded { .. } => "succeeded",
            Self::Unsafe { .. } => "unsafe",
            Self::Failed(_) => "failed",
        }
    }
}

/// Stage outputs captured so resumed runs skip completed work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCheckpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<GeneratedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<SafetyVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioResult>,
}

impl StageCheckpoint {
    /// First stage whose output is not yet checkpointed.
    pub fn resume_stage(&self) -> PipelineStage {
        match (&self.text, &self.verdict, &self.audio) {
            (Some(_), Some(verdict), Some(_)) if verdict.safe => PipelineStage::Persisting,
            (Some(_), Some(verdict), _) if verdict.safe => PipelineStage::Synthesizing,
            (Some(_), _, _) => PipelineStage::Moderating,
            (None, _, _) => PipelineStage::Building,
        }
    }
}

/// Timestamped entry into a stage or terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    /// Stage or terminal status name.
    pub state: String,
    pub run: u32,
    pub at: DateTime<Utc>,
}

/// Durable record of the pipeline runs for one request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub id: AttemptId,
    pub request: GenerationRequest,
    pub payload_hash: PayloadHash,
    pub state: AttemptState,
    pub checkpoint: StageCheckpoint,
    pub transitions: Vec<StageTransition>,
    pub runs: u32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationAttempt {
    /// Start a fresh attempt in [`PipelineStage::Created`].
    pub fn create(
        request: GenerationRequest,
        payload_hash: PayloadHash,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AttemptId::random(),
            request,
            payload_hash,
            state: AttemptState::Active(PipelineStage::Created),
            checkpoint: StageCheckpoint::default(),
            transitions: vec![StageTransition {
                state: PipelineStage::Created.as_str().to_owned(),
                run: 0,
                at: now,
            }],
            runs: 0,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        self.request.request_id()
    }

    /// Record entry into `stage`.
    pub fn enter(&mut self, stage: PipelineStage, now: DateTime<Utc>) {
        self.state = AttemptState::Active(stage);
        self.push_transition(stage.as_str(), now);
    }

    /// Move into a terminal or failed state.
    pub fn close(&mut self, state: AttemptState, now: DateTime<Utc>) {
        let name = state.status_name();
        self.state = state;
        self.lease_expires_at = None;
        self.push_transition(name, now);
    }

    fn push_transition(&mut self, state: &str, now: DateTime<Utc>) {
        self.transitions.push(StageTransition {
            state: state.to_owned(),
            run: self.runs,
            at: now,
        });
        self.updated_at = now;
    }

    /// Whether another run currently holds the lease.
    pub fn is_leased_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|expiry| expiry > now)
    }
}
