//! OpenAI-compatible chat-completions client for story text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::ProviderEndpoint;
use super::dto::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use super::http_errors::{map_status_error, map_transport_error};
use crate::domain::ports::{ProviderError, TextGenerationProvider};
use crate::domain::{GeneratedText, GenerationPayload, count_words};

/// Model requested when none is configured.
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";

const STORY_TEMPERATURE: f32 = 0.7;

/// Text generation adapter for an OpenAI-compatible `/chat/completions` API.
pub struct OpenAiTextProvider {
    client: Client,
    endpoint: ProviderEndpoint,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiTextProvider {
    /// Build an adapter around a shared reqwest client.
    /// ```rust,ignore
    /// let provider = OpenAiTextProvider::new(client, endpoint, DEFAULT_TEXT_MODEL);
    /// ```
    pub fn new(client: Client, endpoint: ProviderEndpoint, model: impl Into<String>) -> Self {
        Self {
            client,
            endpoint,
            model: model.into(),
            max_tokens: None,
        }
    }

    /// Cap the completion length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn request_body<'a>(&'a self, payload: &'a GenerationPayload) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &payload.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &payload.prompt,
                },
            ],
            temperature: STORY_TEMPERATURE,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerationProvider for OpenAiTextProvider {
    async fn generate(
        &self,
        payload: &GenerationPayload,
        timeout: Duration,
    ) -> Result<GeneratedText, ProviderError> {
        let request = self
            .client
            .post(self.endpoint.url.clone())
            .timeout(timeout)
            .json(&self.request_body(payload));
        let response = self
            .endpoint
            .authorise(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        let text = parse_completion(body.as_ref())?;
        debug!(
            model = %self.model,
            tokens = text.token_count,
            "text generation call completed"
        );
        Ok(text)
    }
}

fn parse_completion(body: &[u8]) -> Result<GeneratedText, ProviderError> {
    let decoded: ChatCompletionResponse = serde_json::from_slice(body).map_err(|error| {
        ProviderError::malformed(format!("invalid chat completion payload: {error}"))
    })?;
    let choice = decoded
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::malformed("completion contained no choices"))?;
    check_finish_reason(choice.finish_reason.as_deref())?;
    let text = choice
        .message
        .content
        .map(|content| content.trim().to_owned())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ProviderError::malformed("completion contained no story text"))?;
    let token_count = decoded
        .usage
        .map(|usage| usage.completion_tokens)
        .unwrap_or_else(|| count_words(&text));
    Ok(GeneratedText { text, token_count })
}

/// A story is only usable when the model stopped on its own.
fn check_finish_reason(reason: Option<&str>) -> Result<(), ProviderError> {
    match reason {
        None | Some("stop") => Ok(()),
        Some("length") => Err(ProviderError::malformed(
            "completion was cut off at the token limit",
        )),
        Some("content_filter") => Err(ProviderError::rejected(
            "completion was withheld by the provider content filter",
        )),
        Some(other) => Err(ProviderError::malformed(format!(
            "completion ended with unexpected finish reason `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_first_choice_and_usage() {
        let body = br#"{
            "choices": [{"message": {"role": "assistant", "content": "  Once upon a time.  "}}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 5}
        }"#;
        let text = parse_completion(body).expect("valid completion");
        assert_eq!(text.text, "Once upon a time.");
        assert_eq!(text.token_count, 5);
    }

    #[test]
    fn falls_back_to_word_count_without_usage() {
        let body = br#"{"choices": [{"message": {"content": "Sleep tight little one"}}]}"#;
        let text = parse_completion(body).expect("valid completion");
        assert_eq!(text.token_count, 4);
    }

    #[rstest]
    #[case::no_choices(br#"{"choices": []}"#.as_slice())]
    #[case::null_content(br#"{"choices": [{"message": {"content": null}}]}"#.as_slice())]
    #[case::blank_content(br#"{"choices": [{"message": {"content": "   "}}]}"#.as_slice())]
    #[case::not_json(b"<html>".as_slice())]
    fn unusable_completions_are_malformed(#[case] body: &[u8]) {
        let error = parse_completion(body).expect_err("unusable completion");
        assert!(matches!(error, ProviderError::Malformed { .. }));
        assert!(error.is_retryable());
    }

    #[test]
    fn accepts_completions_that_stopped_naturally() {
        let body = br#"{
            "choices": [{"finish_reason": "stop", "message": {"content": "The end."}}]
        }"#;
        let text = parse_completion(body).expect("finished completion");
        assert_eq!(text.text, "The end.");
    }

    #[test]
    fn truncated_completions_are_malformed() {
        let body = br#"{
            "choices": [{
                "finish_reason": "length",
                "message": {"content": "Once upon a time, Mira found a"}
            }]
        }"#;
        let error = parse_completion(body).expect_err("truncated completion");
        assert!(matches!(error, ProviderError::Malformed { .. }));
        assert!(error.to_string().contains("token limit"), "{error}");
    }

    #[test]
    fn filtered_completions_are_rejected() {
        let body = br#"{
            "choices": [{"finish_reason": "content_filter", "message": {"content": "Once"}}]
        }"#;
        let error = parse_completion(body).expect_err("filtered completion");
        assert!(matches!(error, ProviderError::Rejected { .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn request_body_carries_system_and_user_prompts() {
        let provider = OpenAiTextProvider::new(
            Client::new(),
            ProviderEndpoint {
                url: reqwest::Url::parse("https://llm.invalid/v1/chat/completions")
                    .expect("valid url"),
                api_key: None,
            },
            DEFAULT_TEXT_MODEL,
        )
        .with_max_tokens(900);
        let payload = GenerationPayload {
            title: "A Bedtime Story".to_owned(),
            system_prompt: "be gentle".to_owned(),
            prompt: "tell a story".to_owned(),
        };

        let json = serde_json::to_value(provider.request_body(&payload)).expect("serialise");

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "tell a story");
        assert_eq!(json["max_tokens"], 900);
    }
}
