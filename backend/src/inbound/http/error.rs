//! HTTP adapter mapping for domain errors and generation outcomes.
//!
//! The domain error type stays HTTP-agnostic; this module turns it into a
//! JSON payload and status code. Generation outcomes are not errors, but
//! their status also drives the response code.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use tracing::error;

use crate::domain::ports::{GenerationOutcome, GenerationStatus};
use crate::domain::{Error, ErrorCode, FailureReason, TRACE_ID_HEADER};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, Error>;

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status code for a submission outcome.
///
/// A retryable failure invites the caller to resubmit the same request id,
/// so it reads as `503`; a permanent one is a bad gateway unless the caller's
/// input was at fault.
pub fn status_for_outcome(outcome: &GenerationOutcome) -> StatusCode {
    match outcome.status {
        GenerationStatus::Succeeded => StatusCode::OK,
        GenerationStatus::InProgress => StatusCode::CONFLICT,
        GenerationStatus::Unsafe => StatusCode::UNPROCESSABLE_ENTITY,
        GenerationStatus::Failed if outcome.failure_reason == Some(FailureReason::InvalidInput) => {
            StatusCode::BAD_REQUEST
        }
        GenerationStatus::Failed if outcome.retryable => StatusCode::SERVICE_UNAVAILABLE,
        GenerationStatus::Failed => StatusCode::BAD_GATEWAY,
    }
}

fn redact_if_internal(error: &Error) -> Error {
    if matches!(error.code(), ErrorCode::InternalError) {
        let mut redacted = Error::internal("Internal server error");
        if let Some(id) = error.trace_id() {
            redacted = redacted.with_trace_id(id.to_owned());
        }
        redacted
    } else {
        error.clone()
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let Some(id) = self.trace_id() {
            builder.insert_header((TRACE_ID_HEADER, id.to_owned()));
        }

        builder.json(redact_if_internal(self))
    }
}

impl From<actix_web::Error> for Error {
    fn from(err: actix_web::Error) -> Self {
        error!(error = %err, "actix error promoted to domain error");
        Error::internal("Internal server error")
    }
}
