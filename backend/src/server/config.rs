//! HTTP server configuration object and helpers.

use actix_web::cookie::{Key, SameSite};
use lullaby_backend::domain::StoryPipelineConfig;
use lullaby_backend::outbound::persistence::DbPool;
use std::net::SocketAddr;

use super::settings::ProviderSettings;

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) key: Key,
    pub(crate) cookie_secure: bool,
    pub(crate) same_site: SameSite,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) db_pool: Option<DbPool>,
    pub(crate) pipeline: StoryPipelineConfig,
    pub(crate) providers: ProviderSettings,
}

impl ServerConfig {
    /// Construct a server configuration using application preferences.
    #[must_use]
    pub fn new(
        key: Key,
        cookie_secure: bool,
        same_site: SameSite,
        bind_addr: SocketAddr,
        providers: ProviderSettings,
    ) -> Self {
        Self {
            key,
            cookie_secure,
            same_site,
            bind_addr,
            db_pool: None,
            pipeline: StoryPipelineConfig::default(),
            providers,
        }
    }

    /// Attach a database connection pool.
    ///
    /// Without one the story ports run against in-process storage.
    #[must_use]
    pub fn with_db_pool(mut self, pool: DbPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Override retry, timeout, and lease tuning.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: StoryPipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }
}
