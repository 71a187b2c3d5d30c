//! HTTP text-to-speech client returning a durable audio reference.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::ProviderEndpoint;
use super::dto::{SpeechRequest, SpeechResponse};
use super::http_errors::{map_status_error, map_transport_error};
use crate::domain::ports::{AudioSynthesisProvider, ProviderError};
use crate::domain::{AudioResult, VoicePreference};

/// Audio adapter for a speech service that stores narration and answers with
/// its URL.
pub struct HttpAudioSynthesisProvider {
    client: Client,
    endpoint: ProviderEndpoint,
    default_voice: Option<String>,
}

impl HttpAudioSynthesisProvider {
    pub fn new(client: Client, endpoint: ProviderEndpoint, default_voice: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            default_voice,
        }
    }

    fn voice<'a>(&'a self, requested: &'a VoicePreference) -> Option<&'a str> {
        requested
            .voice_id
            .as_deref()
            .or(self.default_voice.as_deref())
    }
}

#[async_trait]
impl AudioSynthesisProvider for HttpAudioSynthesisProvider {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoicePreference,
        timeout: Duration,
    ) -> Result<AudioResult, ProviderError> {
        let request = self
            .client
            .post(self.endpoint.url.clone())
            .timeout(timeout)
            .json(&SpeechRequest {
                text,
                voice: self.voice(voice),
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
            return Err(map_status_error(status, body.as_ref()));
        }
        parse_speech(body.as_ref())
    }
}

fn parse_speech(body: &[u8]) -> Result<AudioResult, ProviderError> {
    let decoded: SpeechResponse = serde_json::from_slice(body).map_err(|error| {
        ProviderError::malformed(format!("invalid speech payload: {error}"))
    })?;
    let reference = decoded.audio_url.trim().to_owned();
    if reference.is_empty() {
        return Err(ProviderError::malformed("speech response had no audio URL"));
    }
    let duration_seconds = decoded
        .duration_seconds
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| seconds.ceil().min(f64::from(u32::MAX)) as u32);
    Ok(AudioResult {
        reference,
        duration_seconds,
    })
}
