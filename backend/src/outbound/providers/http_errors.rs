//! Transport and status error mapping shared by the provider clients.

use reqwest::StatusCode;

use crate::domain::ports::ProviderError;

pub(super) fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(error.to_string())
    } else if error.is_decode() {
        ProviderError::malformed(error.to_string())
    } else {
        ProviderError::unavailable(error.to_string())
    }
}

pub(super) fn map_status_error(status: StatusCode, body: &[u8]) -> ProviderError {
    let message = status_message(status, body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::timeout(message)
        }
        _ if status.is_client_error() => ProviderError::rejected(message),
        _ => ProviderError::unavailable(message),
    }
}

pub(super) fn status_message(status: StatusCode, body: &[u8]) -> String {
    let preview = body_preview(body);
    if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), preview)
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::rate_limited(StatusCode::TOO_MANY_REQUESTS, true, "rate limited")]
    #[case::request_timeout(StatusCode::REQUEST_TIMEOUT, true, "timed out")]
    #[case::gateway_timeout(StatusCode::GATEWAY_TIMEOUT, true, "timed out")]
    #[case::bad_request(StatusCode::BAD_REQUEST, false, "rejected")]
    #[case::unauthorised(StatusCode::UNAUTHORIZED, false, "rejected")]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, true, "unavailable")]
    #[case::bad_gateway(StatusCode::BAD_GATEWAY, true, "unavailable")]
    fn maps_http_statuses_to_provider_errors(
        #[case] status: StatusCode,
        #[case] retryable: bool,
        #[case] wording: &str,
    ) {
        let error = map_status_error(status, b"{\"error\":\"busy\"}");
        assert_eq!(error.is_retryable(), retryable);
        assert!(error.to_string().contains(wording), "{error}");
    }

    #[test]
    fn long_bodies_are_truncated_and_compacted() {
        let body = format!("  {}  \n tail", "x".repeat(200));
        let message = status_message(StatusCode::BAD_GATEWAY, body.as_bytes());
        assert!(message.starts_with("status 502: "));
        assert!(message.ends_with("..."));
        assert!(!message.contains('\n'));
    }
}
