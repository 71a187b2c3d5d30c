//! Process configuration loaded via OrthoConfig.
//!
//! Each struct reads its own environment prefix, so operators can tune the
//! pipeline without touching server or provider settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use lullaby_backend::domain::StoryPipelineConfig;
use lullaby_backend::outbound::providers::DEFAULT_TEXT_MODEL;
use ortho_config::OrthoConfig;
use serde::Deserialize;

const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080);
const DEFAULT_SESSION_KEY_FILE: &str = "/var/run/secrets/session_key";
const DEFAULT_TEXT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Listener, session, and storage settings.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "LULLABY")]
pub struct ServerSettings {
    /// Socket address for the HTTP listener.
    pub bind_addr: Option<SocketAddr>,
    /// PostgreSQL URL. In-memory storage is used when absent.
    pub database_url: Option<String>,
    /// File holding the session signing key material.
    pub session_key_file: Option<PathBuf>,
    /// Mark the session cookie `Secure`.
    #[ortho_config(default = true)]
    pub cookie_secure: bool,
    /// Fall back to a generated session key when the key file is unreadable.
    #[ortho_config(default = false)]
    pub allow_ephemeral_session_key: bool,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr.unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn session_key_file(&self) -> PathBuf {
        self.session_key_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_KEY_FILE))
    }
}

/// Retry, timeout, and lease tuning for the story pipeline.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "LULLABY_PIPELINE")]
pub struct PipelineSettings {
    /// Calls per stage within one run, including the first.
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    /// Deadline for each provider call.
    pub provider_timeout_ms: Option<u64>,
    /// How long a run owns an attempt between checkpoints.
    pub lease_seconds: Option<u64>,
}

/// Rejected pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineSettingsError {
    #[error(
        "lease of {lease_secs}s is shorter than the worst-case stage time of {stage_secs}s; \
         raise LULLABY_PIPELINE_LEASE_SECONDS or lower the retry budget"
    )]
    LeaseTooShort { lease_secs: u64, stage_secs: u64 },
}

impl PipelineSettings {
    /// Overlay configured values on the pipeline defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineSettingsError::LeaseTooShort`] when a run could
    /// outlive its lease inside one stage, letting a second run take over.
    pub fn to_config(&self) -> Result<StoryPipelineConfig, PipelineSettingsError> {
        let defaults = StoryPipelineConfig::default();
        let config = StoryPipelineConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_backoff: self
                .initial_backoff_ms
                .map_or(defaults.initial_backoff, Duration::from_millis),
            max_backoff: self
                .max_backoff_ms
                .map_or(defaults.max_backoff, Duration::from_millis),
            provider_timeout: self
                .provider_timeout_ms
                .map_or(defaults.provider_timeout, Duration::from_millis),
            lease_duration: self
                .lease_seconds
                .map_or(defaults.lease_duration, Duration::from_secs),
        };

        let stage = config.worst_case_stage_duration();
        if config.lease_duration <= stage {
            return Err(PipelineSettingsError::LeaseTooShort {
                lease_secs: config.lease_duration.as_secs(),
                stage_secs: stage.as_secs() + u64::from(stage.subsec_nanos() > 0),
            });
        }
        Ok(config)
    }
}

/// How generated text is screened before narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationMode {
    /// Local versioned word list.
    Keyword,
    /// Remote moderation endpoint.
    Http,
}

/// Endpoints and credentials for the external providers.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "LULLABY_PROVIDERS")]
pub struct ProviderSettings {
    /// OpenAI-compatible chat completions URL.
    pub text_url: Option<String>,
    pub text_model: Option<String>,
    pub text_api_key: Option<String>,
    /// Completion token cap; unset leaves the provider default.
    pub text_max_tokens: Option<u32>,
    /// `keyword` (default) or `http`.
    pub moderation_mode: Option<String>,
    pub moderation_url: Option<String>,
    pub moderation_api_key: Option<String>,
    pub audio_url: Option<String>,
    pub audio_api_key: Option<String>,
    /// Voice used when a request names none.
    pub audio_default_voice: Option<String>,
}

/// Rejected provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderSettingsError {
    #[error("unknown moderation mode `{0}`; expected `keyword` or `http`")]
    UnknownModerationMode(String),
    #[error("{setting} is required")]
    Missing { setting: &'static str },
}

impl ProviderSettings {
    pub fn text_url(&self) -> &str {
        self.text_url.as_deref().unwrap_or(DEFAULT_TEXT_URL)
    }

    pub fn text_model(&self) -> &str {
        self.text_model.as_deref().unwrap_or(DEFAULT_TEXT_MODEL)
    }

    /// Parse the moderation mode, defaulting to the keyword list.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderSettingsError::UnknownModerationMode`] for any other
    /// value.
    pub fn moderation_mode(&self) -> Result<ModerationMode, ProviderSettingsError> {
        match self.moderation_mode.as_deref().map(str::trim) {
            None | Some("") => Ok(ModerationMode::Keyword),
            Some(mode) if mode.eq_ignore_ascii_case("keyword") => Ok(ModerationMode::Keyword),
            Some(mode) if mode.eq_ignore_ascii_case("http") => Ok(ModerationMode::Http),
            Some(other) => Err(ProviderSettingsError::UnknownModerationMode(
                other.to_owned(),
            )),
        }
    }

    /// The moderation URL; required in `http` mode.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderSettingsError::Missing`] when unset.
    pub fn moderation_url(&self) -> Result<&str, ProviderSettingsError> {
        self.moderation_url
            .as_deref()
            .ok_or(ProviderSettingsError::Missing {
                setting: "LULLABY_PROVIDERS_MODERATION_URL",
            })
    }

    /// The audio synthesis URL. There is no public default.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderSettingsError::Missing`] when unset.
    pub fn audio_url(&self) -> Result<&str, ProviderSettingsError> {
        self.audio_url
            .as_deref()
            .ok_or(ProviderSettingsError::Missing {
                setting: "LULLABY_PROVIDERS_AUDIO_URL",
            })
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const SERVER_VARS: [&str; 5] = [
        "LULLABY_BIND_ADDR",
        "LULLABY_DATABASE_URL",
        "LULLABY_SESSION_KEY_FILE",
        "LULLABY_COOKIE_SECURE",
        "LULLABY_ALLOW_EPHEMERAL_SESSION_KEY",
    ];

    const PIPELINE_VARS: [&str; 5] = [
        "LULLABY_PIPELINE_MAX_ATTEMPTS",
        "LULLABY_PIPELINE_INITIAL_BACKOFF_MS",
        "LULLABY_PIPELINE_MAX_BACKOFF_MS",
        "LULLABY_PIPELINE_PROVIDER_TIMEOUT_MS",
        "LULLABY_PIPELINE_LEASE_SECONDS",
    ];

    fn args() -> [OsString; 1] {
        [OsString::from("lullaby-backend")]
    }

    fn cleared(vars: &[&'static str]) -> Vec<(&'static str, Option<String>)> {
        vars.iter().map(|name| (*name, None)).collect()
    }

    #[rstest]
    fn server_defaults_are_used_when_missing() {
        let _guard = lock_env(cleared(&SERVER_VARS));

        let settings = ServerSettings::load_from_iter(args()).expect("config should load");
        assert_eq!(settings.bind_addr(), DEFAULT_BIND_ADDR);
        assert_eq!(
            settings.session_key_file(),
            PathBuf::from(DEFAULT_SESSION_KEY_FILE)
        );
        assert!(settings.database_url.is_none());
        assert!(settings.cookie_secure);
        assert!(!settings.allow_ephemeral_session_key);
    }

    #[rstest]
    fn server_environment_overrides_are_respected() {
        let _guard = lock_env([
            ("LULLABY_BIND_ADDR", Some("127.0.0.1:9000".to_owned())),
            (
                "LULLABY_DATABASE_URL",
                Some("postgres://lullaby@localhost/lullaby".to_owned()),
            ),
            ("LULLABY_SESSION_KEY_FILE", Some("/tmp/key".to_owned())),
            ("LULLABY_COOKIE_SECURE", Some("false".to_owned())),
            ("LULLABY_ALLOW_EPHEMERAL_SESSION_KEY", Some("true".to_owned())),
        ]);

        let settings = ServerSettings::load_from_iter(args()).expect("config should load");
        assert_eq!(settings.bind_addr(), SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(
            settings.database_url.as_deref(),
            Some("postgres://lullaby@localhost/lullaby")
        );
        assert_eq!(settings.session_key_file(), PathBuf::from("/tmp/key"));
        assert!(!settings.cookie_secure);
        assert!(settings.allow_ephemeral_session_key);
    }

    #[rstest]
    fn pipeline_defaults_match_domain_defaults() {
        let _guard = lock_env(cleared(&PIPELINE_VARS));

        let settings = PipelineSettings::load_from_iter(args()).expect("config should load");
        assert_eq!(settings.to_config(), Ok(StoryPipelineConfig::default()));
    }

    #[rstest]
    fn pipeline_environment_overrides_are_respected() {
        let _guard = lock_env([
            ("LULLABY_PIPELINE_MAX_ATTEMPTS", Some("5".to_owned())),
            ("LULLABY_PIPELINE_INITIAL_BACKOFF_MS", Some("250".to_owned())),
            ("LULLABY_PIPELINE_MAX_BACKOFF_MS", Some("2000".to_owned())),
            ("LULLABY_PIPELINE_PROVIDER_TIMEOUT_MS", Some("10000".to_owned())),
            ("LULLABY_PIPELINE_LEASE_SECONDS", Some("120".to_owned())),
        ]);

        let config = PipelineSettings::load_from_iter(args())
            .expect("config should load")
            .to_config()
            .expect("lease outlasts a stage");
        assert_eq!(
            config,
            StoryPipelineConfig {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(2),
                provider_timeout: Duration::from_secs(10),
                lease_duration: Duration::from_secs(120),
            }
        );
    }

    #[rstest]
    fn zero_max_attempts_still_makes_one_call() {
        let settings = PipelineSettings {
            max_attempts: Some(0),
            initial_backoff_ms: None,
            max_backoff_ms: None,
            provider_timeout_ms: None,
            lease_seconds: None,
        };
        let config = settings.to_config().expect("defaults are consistent");
        assert_eq!(config.max_attempts, 1);
    }

    #[rstest]
    #[case::lease_below_default_stage_time(None, None, Some(60))]
    #[case::retry_budget_outgrows_default_lease(Some(10), Some(30_000), None)]
    fn lease_shorter_than_a_stage_is_rejected(
        #[case] max_attempts: Option<u32>,
        #[case] provider_timeout_ms: Option<u64>,
        #[case] lease_seconds: Option<u64>,
    ) {
        let settings = PipelineSettings {
            max_attempts,
            initial_backoff_ms: None,
            max_backoff_ms: None,
            provider_timeout_ms,
            lease_seconds,
        };
        assert!(matches!(
            settings.to_config(),
            Err(PipelineSettingsError::LeaseTooShort { .. })
        ));
    }

    fn providers(mode: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            text_url: None,
            text_model: None,
            text_api_key: None,
            text_max_tokens: None,
            moderation_mode: mode.map(str::to_owned),
            moderation_url: None,
            moderation_api_key: None,
            audio_url: None,
            audio_api_key: None,
            audio_default_voice: None,
        }
    }

    #[rstest]
    #[case(None, ModerationMode::Keyword)]
    #[case(Some(""), ModerationMode::Keyword)]
    #[case(Some("keyword"), ModerationMode::Keyword)]
    #[case(Some("HTTP"), ModerationMode::Http)]
    fn moderation_mode_parses(#[case] raw: Option<&str>, #[case] expected: ModerationMode) {
        assert_eq!(providers(raw).moderation_mode(), Ok(expected));
    }

    #[rstest]
    fn unknown_moderation_mode_is_rejected() {
        assert_eq!(
            providers(Some("vibes")).moderation_mode(),
            Err(ProviderSettingsError::UnknownModerationMode(
                "vibes".to_owned()
            ))
        );
    }

    #[rstest]
    fn provider_defaults_target_openai() {
        let settings = providers(None);
        assert_eq!(settings.text_url(), DEFAULT_TEXT_URL);
        assert_eq!(settings.text_model(), "gpt-4o-mini");
        assert!(matches!(
            settings.audio_url(),
            Err(ProviderSettingsError::Missing { .. })
        ));
    }

    #[rstest]
    fn text_token_cap_is_read_from_the_environment() {
        let _guard = lock_env([("LULLABY_PROVIDERS_TEXT_MAX_TOKENS", Some("900".to_owned()))]);

        let settings = ProviderSettings::load_from_iter(args()).expect("config should load");
        assert_eq!(settings.text_max_tokens, Some(900));
    }
}
