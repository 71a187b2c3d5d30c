//! Mapping helpers from port errors to attempt failures and domain errors.

use crate::domain::ports::{
    ChildProfileRepositoryError, GenerationAttemptRepositoryError, ModerationError,
    ProviderError, StoryRepositoryError,
};
use crate::domain::{AttemptFailure, Error, FailureReason, PipelineStage, PromptBuildError};

pub(super) fn provider_failure(
    stage: PipelineStage,
    error: &ProviderError,
    calls: u32,
) -> AttemptFailure {
    let reason = match error {
        ProviderError::Timeout { .. } => FailureReason::ProviderTimeout,
        ProviderError::RateLimited { .. } => FailureReason::ProviderRateLimited,
        ProviderError::Unavailable { .. } => FailureReason::ProviderUnavailable,
        ProviderError::Rejected { .. } => FailureReason::ProviderRejected,
        ProviderError::Malformed { .. } => FailureReason::ProviderMalformedOutput,
    };
    let message = if error.is_retryable() {
        format!("retry budget exhausted after {calls} calls: {error}")
    } else {
        error.to_string()
    };
    AttemptFailure {
        stage,
        reason,
        retryable: error.is_retryable(),
        calls,
        message,
    }
}

pub(super) fn moderation_failure(error: &ModerationError) -> AttemptFailure {
    AttemptFailure {
        stage: PipelineStage::Moderating,
        reason: FailureReason::ModerationUnavailable,
        retryable: true,
        calls: 1,
        message: error.to_string(),
    }
}

pub(super) fn prompt_failure(error: &PromptBuildError) -> AttemptFailure {
    AttemptFailure {
        stage: PipelineStage::Building,
        reason: FailureReason::InvalidInput,
        retryable: false,
        calls: 0,
        message: error.to_string(),
    }
}

pub(super) fn persistence_failure(error: &StoryRepositoryError, calls: u32) -> AttemptFailure {
    AttemptFailure {
        stage: PipelineStage::Persisting,
        reason: FailureReason::PersistenceFailure,
        retryable: true,
        calls,
        message: format!("story commit failed after {calls} calls: {error}"),
    }
}

pub(super) fn cancelled(stage: PipelineStage, calls: u32) -> AttemptFailure {
    AttemptFailure {
        stage,
        reason: FailureReason::Cancelled,
        retryable: true,
        calls,
        message: format!("cancelled before {stage} completed"),
    }
}

pub(super) fn map_profile_error(error: ChildProfileRepositoryError) -> Error {
    match error {
        ChildProfileRepositoryError::NotFound { child_id } => {
            Error::not_found(format!("child {child_id} not found"))
        }
        ChildProfileRepositoryError::Forbidden { child_id } => {
            Error::forbidden(format!("child {child_id} belongs to another user"))
        }
        ChildProfileRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("child profiles unavailable: {message}"))
        }
        ChildProfileRepositoryError::Query { message } => {
            Error::internal(format!("child profile lookup failed: {message}"))
        }
    }
}

pub(super) fn map_attempt_error(error: GenerationAttemptRepositoryError) -> Error {
    match error {
        GenerationAttemptRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("attempt storage unavailable: {message}"))
        }
        other => Error::internal(format!("attempt storage failed: {other}")),
    }
}

pub(super) fn map_story_error(error: StoryRepositoryError) -> Error {
    match error {
        StoryRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("story storage unavailable: {message}"))
        }
        StoryRepositoryError::Query { message } => {
            Error::internal(format!("story lookup failed: {message}"))
        }
        other @ StoryRepositoryError::LeaseLost { .. } => {
            Error::internal(format!("story storage failed: {other}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(ProviderError::timeout("slow"), FailureReason::ProviderTimeout, true)]
    #[case(ProviderError::rate_limited("429"), FailureReason::ProviderRateLimited, true)]
    #[case(ProviderError::unavailable("503"), FailureReason::ProviderUnavailable, true)]
    #[case(ProviderError::malformed("no text"), FailureReason::ProviderMalformedOutput, true)]
    #[case(ProviderError::rejected("bad voice"), FailureReason::ProviderRejected, false)]
    fn provider_errors_map_to_reasons(
        #[case] error: ProviderError,
        #[case] reason: FailureReason,
        #[case] retryable: bool,
    ) {
        let failure = provider_failure(PipelineStage::Synthesizing, &error, 3);
        assert_eq!(failure.reason, reason);
        assert_eq!(failure.retryable, retryable);
        assert_eq!(failure.stage, PipelineStage::Synthesizing);
    }

    #[rstest]
    #[case(ChildProfileRepositoryError::not_found("c"), ErrorCode::NotFound)]
    #[case(ChildProfileRepositoryError::forbidden("c"), ErrorCode::Forbidden)]
    #[case(ChildProfileRepositoryError::connection("down"), ErrorCode::ServiceUnavailable)]
    #[case(ChildProfileRepositoryError::query("bad row"), ErrorCode::InternalError)]
    fn profile_errors_map_to_codes(
        #[case] error: ChildProfileRepositoryError,
        #[case] code: ErrorCode,
    ) {
        assert_eq!(map_profile_error(error).code(), code);
    }

    #[rstest]
    fn moderation_failures_fail_closed_but_stay_retryable() {
        let failure = moderation_failure(&ModerationError::timeout("5s"));
        assert_eq!(failure.reason, FailureReason::ModerationUnavailable);
        assert!(failure.retryable);
    }
}
