//! Reqwest-backed clients for the text, moderation, and audio providers,
//! plus a local keyword moderator.
//!
//! Adapters own transport details only: request serialisation, per-call
//! timeouts, HTTP error mapping, and response decoding. Each trait call makes
//! exactly one HTTP request; retry policy belongs to the pipeline.

mod dto;
mod http_audio;
mod http_errors;
mod http_moderation;
mod keyword_moderation;
mod openai_text;

pub use http_audio::HttpAudioSynthesisProvider;
pub use http_moderation::HttpModerationProvider;
pub use keyword_moderation::{KEYWORD_LIST_VERSION, KeywordModerationProvider};
pub use openai_text::{DEFAULT_TEXT_MODEL, OpenAiTextProvider};

/// Endpoint and credentials shared by the HTTP provider clients.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    /// Fully qualified request URL.
    pub url: reqwest::Url,
    /// Bearer token; omitted from requests when `None`.
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    pub(crate) fn authorise(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}
