//! Resolve the request id of a story submission from its headers.
//!
//! The `Idempotency-Key` header carries the request id. When a client omits
//! it, the server issues a fresh one and returns it in the response body so
//! the client can resubmit or poll.

use actix_web::http::header::HeaderMap;
use serde_json::json;

use crate::domain::{Error, IdentifierValidationError, RequestId};

/// HTTP header name for idempotency keys.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Request id named by the `Idempotency-Key` header, if present.
pub fn extract_request_id(headers: &HeaderMap) -> Result<Option<RequestId>, Error> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| invalid_key_error(IdentifierValidationError::Invalid { kind: "request id" }))?;
    RequestId::new(raw.trim()).map(Some).map_err(invalid_key_error)
}

/// Request id for a submission: the header value, or a fresh id.
pub fn resolve_request_id(headers: &HeaderMap) -> Result<RequestId, Error> {
    Ok(extract_request_id(headers)?.unwrap_or_else(RequestId::random))
}

fn invalid_key_error(err: IdentifierValidationError) -> Error {
    let message = match err {
        IdentifierValidationError::Empty { .. } => "idempotency-key header must not be empty",
        IdentifierValidationError::Invalid { .. } => "idempotency-key header must be a valid uuid",
    };
    Error::invalid_request(message).with_details(json!({
        "header": IDEMPOTENCY_KEY_HEADER,
        "code": "invalid_idempotency_key",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};
    use rstest::rstest;

    use crate::domain::ErrorCode;

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(value) = value {
            map.insert(
                HeaderName::from_static("idempotency-key"),
                HeaderValue::from_str(value).expect("header value"),
            );
        }
        map
    }

    #[rstest]
    fn header_value_becomes_request_id() {
        let id = "0d5bdbd8-6c4c-4f7f-9a9e-7f3a1f0c2b11";
        let resolved = resolve_request_id(&headers(Some(id))).expect("valid key");
        assert_eq!(resolved.as_ref(), id);
    }

    #[rstest]
    fn missing_header_issues_fresh_ids() {
        let first = resolve_request_id(&headers(None)).expect("generated");
        let second = resolve_request_id(&headers(None)).expect("generated");
        assert_ne!(first, second);
        assert!(extract_request_id(&headers(None)).expect("ok").is_none());
    }

    #[rstest]
    #[case("")]
    #[case("not-a-uuid")]
    fn malformed_keys_are_invalid_requests(#[case] value: &str) {
        let err = resolve_request_id(&headers(Some(value))).expect_err("rejected");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}
