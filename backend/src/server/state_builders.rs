//! Builders wiring storage and provider adapters into the story pipeline.

use std::sync::Arc;

use mockable::DefaultClock;
use reqwest::{Client, Url};
use tracing::info;

use lullaby_backend::domain::ports::{
    AudioSynthesisProvider, ChildProfileRepository, GenerationAttemptRepository,
    ModerationProvider, StoryRepository, TextGenerationProvider,
};
use lullaby_backend::domain::{StoryPipeline, StoryPipelinePorts};
use lullaby_backend::inbound::http::state::HttpState;
use lullaby_backend::outbound::memory::InMemoryStoryStore;
use lullaby_backend::outbound::persistence::{
    DbPool, DieselChildProfileRepository, DieselGenerationAttemptRepository, DieselStoryRepository,
};
use lullaby_backend::outbound::providers::{
    HttpAudioSynthesisProvider, HttpModerationProvider, KEYWORD_LIST_VERSION,
    KeywordModerationProvider, OpenAiTextProvider, ProviderEndpoint,
};

use super::ServerConfig;
use super::settings::{ModerationMode, ProviderSettings, ProviderSettingsError};

/// Failure to assemble the application's adapters.
#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error(transparent)]
    Settings(#[from] ProviderSettingsError),
    #[error("{setting} is not a valid URL: {message}")]
    InvalidUrl {
        setting: &'static str,
        message: String,
    },
    #[error("failed to build provider HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl From<WiringError> for std::io::Error {
    fn from(error: WiringError) -> Self {
        std::io::Error::other(error)
    }
}

struct StoragePorts {
    profiles: Arc<dyn ChildProfileRepository>,
    attempts: Arc<dyn GenerationAttemptRepository>,
    stories: Arc<dyn StoryRepository>,
}

struct ProviderPorts {
    text: Arc<dyn TextGenerationProvider>,
    moderation: Arc<dyn ModerationProvider>,
    audio: Arc<dyn AudioSynthesisProvider>,
}

/// Use Diesel repositories when a pool is available, otherwise in-process
/// storage.
fn build_storage(pool: Option<&DbPool>) -> StoragePorts {
    match pool {
        Some(pool) => StoragePorts {
            profiles: Arc::new(DieselChildProfileRepository::new(pool.clone())),
            attempts: Arc::new(DieselGenerationAttemptRepository::new(pool.clone())),
            stories: Arc::new(DieselStoryRepository::new(pool.clone())),
        },
        None => {
            info!("no database configured; story state lives in memory");
            let store = Arc::new(InMemoryStoryStore::new());
            StoragePorts {
                profiles: store.clone(),
                attempts: store.clone(),
                stories: store,
            }
        }
    }
}

fn endpoint(
    setting: &'static str,
    url: &str,
    api_key: Option<&String>,
) -> Result<ProviderEndpoint, WiringError> {
    let url = Url::parse(url).map_err(|err| WiringError::InvalidUrl {
        setting,
        message: err.to_string(),
    })?;
    Ok(ProviderEndpoint {
        url,
        api_key: api_key.cloned(),
    })
}

fn build_moderation(
    client: &Client,
    settings: &ProviderSettings,
) -> Result<Arc<dyn ModerationProvider>, WiringError> {
    match settings.moderation_mode()? {
        ModerationMode::Keyword => {
            info!(list_version = KEYWORD_LIST_VERSION, "using keyword moderation");
            Ok(Arc::new(KeywordModerationProvider::default()))
        }
        ModerationMode::Http => {
            let endpoint = endpoint(
                "LULLABY_PROVIDERS_MODERATION_URL",
                settings.moderation_url()?,
                settings.moderation_api_key.as_ref(),
            )?;
            Ok(Arc::new(HttpModerationProvider::new(client.clone(), endpoint)))
        }
    }
}

fn build_providers(settings: &ProviderSettings) -> Result<ProviderPorts, WiringError> {
    let client = Client::builder()
        .user_agent(concat!("lullaby-backend/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let text_endpoint = endpoint(
        "LULLABY_PROVIDERS_TEXT_URL",
        settings.text_url(),
        settings.text_api_key.as_ref(),
    )?;
    let audio_endpoint = endpoint(
        "LULLABY_PROVIDERS_AUDIO_URL",
        settings.audio_url()?,
        settings.audio_api_key.as_ref(),
    )?;

    let mut text = OpenAiTextProvider::new(client.clone(), text_endpoint, settings.text_model());
    if let Some(max_tokens) = settings.text_max_tokens {
        text = text.with_max_tokens(max_tokens);
    }

    Ok(ProviderPorts {
        text: Arc::new(text),
        moderation: build_moderation(&client, settings)?,
        audio: Arc::new(HttpAudioSynthesisProvider::new(
            client,
            audio_endpoint,
            settings.audio_default_voice.clone(),
        )),
    })
}

/// Build the HTTP state around a single shared [`StoryPipeline`].
///
/// # Errors
///
/// Returns [`WiringError`] when provider settings are missing or malformed.
pub(crate) fn build_http_state(config: &ServerConfig) -> Result<HttpState, WiringError> {
    let storage = build_storage(config.db_pool.as_ref());
    let providers = build_providers(&config.providers)?;

    let pipeline = Arc::new(StoryPipeline::new(
        StoryPipelinePorts::new(
            storage.profiles,
            storage.attempts,
            storage.stories,
            providers.text,
            providers.moderation,
            providers.audio,
        ),
        Arc::new(DefaultClock),
        config.pipeline.clone(),
    ));

    Ok(HttpState::new(pipeline.clone(), pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::{Key, SameSite};
    use rstest::{fixture, rstest};

    #[fixture]
    fn providers() -> ProviderSettings {
        ProviderSettings {
            text_url: None,
            text_model: None,
            text_api_key: Some("sk-test".to_owned()),
            text_max_tokens: None,
            moderation_mode: None,
            moderation_url: None,
            moderation_api_key: None,
            audio_url: Some("https://speech.example.test/v1/narrate".to_owned()),
            audio_api_key: None,
            audio_default_voice: Some("calm-narrator".to_owned()),
        }
    }

    fn config(providers: ProviderSettings) -> ServerConfig {
        ServerConfig::new(
            Key::generate(),
            false,
            SameSite::Lax,
            "127.0.0.1:0".parse().expect("valid address"),
            providers,
        )
    }

    #[rstest]
    fn builds_in_memory_state_without_a_pool(providers: ProviderSettings) {
        assert!(build_http_state(&config(providers)).is_ok());
    }

    #[rstest]
    fn missing_audio_url_is_reported(mut providers: ProviderSettings) {
        providers.audio_url = None;

        let err = build_http_state(&config(providers)).err().expect("wiring error");
        assert!(matches!(
            err,
            WiringError::Settings(ProviderSettingsError::Missing {
                setting: "LULLABY_PROVIDERS_AUDIO_URL"
            })
        ));
    }

    #[rstest]
    fn malformed_text_url_is_reported(mut providers: ProviderSettings) {
        providers.text_url = Some("not a url".to_owned());

        let err = build_http_state(&config(providers)).err().expect("wiring error");
        assert!(matches!(
            err,
            WiringError::InvalidUrl {
                setting: "LULLABY_PROVIDERS_TEXT_URL",
                ..
            }
        ));
    }

    #[rstest]
    fn http_moderation_requires_a_url(mut providers: ProviderSettings) {
        providers.moderation_mode = Some("http".to_owned());

        let err = build_http_state(&config(providers)).err().expect("wiring error");
        assert!(matches!(
            err,
            WiringError::Settings(ProviderSettingsError::Missing {
                setting: "LULLABY_PROVIDERS_MODERATION_URL"
            })
        ));
    }

    #[rstest]
    fn http_moderation_builds_with_a_url(mut providers: ProviderSettings) {
        providers.moderation_mode = Some("http".to_owned());
        providers.moderation_url = Some("https://moderation.example.test/v1/check".to_owned());

        assert!(build_http_state(&config(providers)).is_ok());
    }

    #[rstest]
    fn text_token_cap_is_applied(mut providers: ProviderSettings) {
        providers.text_max_tokens = Some(900);

        assert!(build_http_state(&config(providers)).is_ok());
    }
}
