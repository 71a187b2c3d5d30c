//! Domain primitives, the prompt builder, and the story pipeline.
//!
//! Purpose: keep generation semantics transport agnostic. Inbound adapters
//! call the driving ports in [`ports`]; the pipeline reaches providers and
//! storage only through the driven ports defined there.
//!
//! Public surface:
//! - [`Error`] / [`ErrorCode`]: transport-agnostic error payload.
//! - [`GenerationRequest`], [`Story`], [`GenerationAttempt`]: the data model.
//! - [`build_prompt`]: deterministic prompt construction.
//! - [`StoryPipeline`]: the coordinator implementing the driving ports.

pub mod attempt;
pub mod child_profile;
pub mod error;
pub mod identifiers;
pub mod payload_hash;
pub mod ports;
pub mod prompt_builder;
pub mod stage_outputs;
pub mod story;
pub mod story_pipeline;
pub mod trace_id;

pub use self::attempt::{
    AttemptFailure, AttemptState, FailureReason, GenerationAttempt, PipelineStage,
    StageCheckpoint, StageTransition, UnknownStateName,
};
pub use self::child_profile::{Child, ChildProfile};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::identifiers::{
    AttemptId, ChildId, IdentifierValidationError, RequestId, StoryId, UserId,
};
pub use self::payload_hash::{PayloadHash, PayloadHashError, canonicalize_and_hash};
pub use self::prompt_builder::{
    DEFAULT_CHILD_NAME, DEFAULT_DAILY_EVENT, DEFAULT_FRIEND_NAME, DEFAULT_MORAL,
    GenerationPayload, PromptBuildError, build_prompt,
};
pub use self::stage_outputs::{ApprovedText, AudioResult, GeneratedText, SafetyVerdict};
pub use self::story::{
    GenerationRequest, NARRATION_WORDS_PER_MINUTE, PromptDetails, Story, StoredStory,
    SubmissionFingerprint, UnsafeStoredStory, VoicePreference, count_words,
    estimate_narration_seconds,
};
pub use self::story_pipeline::{
    AttemptJitter, BackoffJitter, PipelineSleeper, StoryPipeline, StoryPipelineConfig,
    StoryPipelinePorts, StoryPipelineRuntime, TokioSleeper,
};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use lullaby_backend::domain::{ApiResult, Error};
///
/// fn lookup() -> ApiResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// assert!(lookup().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;
