//! OpenAI-compatible moderation client.
//!
//! Any failure to obtain a verdict is reported as [`ModerationError`], which
//! the pipeline treats as fail-closed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::ProviderEndpoint;
use super::dto::{ModerationRequest, ModerationResponse};
use super::http_errors::status_message;
use crate::domain::SafetyVerdict;
use crate::domain::ports::{ModerationError, ModerationProvider};

const DEFAULT_MODERATION_MODEL: &str = "omni-moderation-latest";

/// Moderation adapter for an OpenAI-compatible `/moderations` API.
pub struct HttpModerationProvider {
    client: Client,
    endpoint: ProviderEndpoint,
    model: String,
}

impl HttpModerationProvider {
    pub fn new(client: Client, endpoint: ProviderEndpoint) -> Self {
        Self {
            client,
            endpoint,
            model: DEFAULT_MODERATION_MODEL.to_owned(),
        }
    }

    /// Override the moderation model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl ModerationProvider for HttpModerationProvider {
    async fn moderate(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<SafetyVerdict, ModerationError> {
        let request = self
            .client
            .post(self.endpoint.url.clone())
            .timeout(timeout)
            .json(&ModerationRequest {
                model: &self.model,
                input: text,
            });
        let response = self
            .endpoint
            .authorise(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(ModerationError::unavailable(status_message(
                status,
                body.as_ref(),
            )));
        }
        parse_verdict(body.as_ref())
    }
}

fn map_transport_error(error: reqwest::Error) -> ModerationError {
    if error.is_timeout() {
        ModerationError::timeout(error.to_string())
    } else {
        ModerationError::unavailable(error.to_string())
    }
}

fn parse_verdict(body: &[u8]) -> Result<SafetyVerdict, ModerationError> {
    let decoded: ModerationResponse = serde_json::from_slice(body).map_err(|error| {
        ModerationError::unavailable(format!("invalid moderation payload: {error}"))
    })?;
    let result = decoded
        .results
        .into_iter()
        .next()
        .ok_or_else(|| ModerationError::unavailable("moderation returned no results"))?;
    if !result.flagged {
        return Ok(SafetyVerdict::safe());
    }
    let mut codes: Vec<String> = result
        .categories
        .into_iter()
        .filter_map(|(category, hit)| hit.then_some(category))
        .collect();
    if codes.is_empty() {
        codes.push("flagged".to_owned());
    }
    Ok(SafetyVerdict::unsafe_with(codes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unflagged_text_is_safe() {
        let body = br#"{"results": [{"flagged": false, "categories": {"violence": false}}]}"#;
        let verdict = parse_verdict(body).expect("valid payload");
        assert!(verdict.safe);
        assert!(verdict.reason_codes.is_empty());
    }

    #[test]
    fn flagged_categories_become_reason_codes() {
        let verdict = parse_verdict(
            br#"{"results": [{"flagged": true, "categories": {"violence": true, "harassment": false, "self-harm": true}}]}"#,
        )
        .expect("valid payload");
        assert!(!verdict.safe);
        let codes: Vec<&str> = verdict.reason_codes.iter().map(String::as_str).collect();
        assert_eq!(codes, vec!["self-harm", "violence"]);
    }

    #[test]
    fn flagged_without_categories_still_fails() {
        let verdict =
            parse_verdict(br#"{"results": [{"flagged": true}]}"#).expect("valid payload");
        assert!(!verdict.safe);
        assert!(verdict.reason_codes.contains("flagged"));
    }

    #[test]
    fn missing_results_are_indeterminate() {
        let error = parse_verdict(br#"{"results": []}"#).expect_err("no verdict");
        assert!(matches!(error, ModerationError::Unavailable { .. }));
    }
}
