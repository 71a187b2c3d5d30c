//! Backend entry-point: loads settings, prepares storage, and serves the
//! story API with its OpenAPI docs.

mod server;

use std::ffi::OsString;

use actix_web::cookie::{Key, SameSite};
use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use lullaby_backend::inbound::http::health::HealthState;
use lullaby_backend::outbound::persistence::{DbPool, PoolConfig, run_pending_migrations};
use server::settings::{PipelineSettings, ProviderSettings, ServerSettings};
use server::{ServerConfig, create_server};

fn load<T: OrthoConfig>(name: &str) -> std::io::Result<T> {
    T::load_from_iter([OsString::from("lullaby-backend")])
        .map_err(|e| std::io::Error::other(format!("failed to load {name} settings: {e}")))
}

fn load_session_key(settings: &ServerSettings) -> std::io::Result<Key> {
    let key_path = settings.session_key_file();
    match std::fs::read(&key_path) {
        Ok(bytes) if bytes.len() >= 32 => Ok(Key::derive_from(&bytes)),
        Ok(bytes) => Err(std::io::Error::other(format!(
            "session key at {} is {} bytes; at least 32 are required",
            key_path.display(),
            bytes.len()
        ))),
        Err(e) => {
            if cfg!(debug_assertions) || settings.allow_ephemeral_session_key {
                warn!(
                    path = %key_path.display(),
                    error = %e,
                    "using temporary session key (dev only)"
                );
                Ok(Key::generate())
            } else {
                Err(std::io::Error::other(format!(
                    "failed to read session key at {}: {e}",
                    key_path.display()
                )))
            }
        }
    }
}

async fn connect_database(database_url: &str) -> std::io::Result<DbPool> {
    let applied = run_pending_migrations(database_url)
        .await
        .map_err(std::io::Error::other)?;
    info!(applied, "database migrations up to date");

    let pool = DbPool::new(PoolConfig::new(database_url))
        .await
        .map_err(std::io::Error::other)?;
    pool.ping().await.map_err(std::io::Error::other)?;
    Ok(pool)
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let server_settings: ServerSettings = load("server")?;
    let pipeline_settings: PipelineSettings = load("pipeline")?;
    let provider_settings: ProviderSettings = load("provider")?;

    let pipeline_config = pipeline_settings
        .to_config()
        .map_err(std::io::Error::other)?;
    let key = load_session_key(&server_settings)?;
    let mut config = ServerConfig::new(
        key,
        server_settings.cookie_secure,
        SameSite::Lax,
        server_settings.bind_addr(),
        provider_settings,
    )
    .with_pipeline(pipeline_config);

    if let Some(database_url) = server_settings.database_url.as_deref() {
        config = config.with_db_pool(connect_database(database_url).await?);
    }

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), config)?;
    info!(bind_addr = %server_settings.bind_addr(), "story API listening");

    let result = server.await;
    health_state.mark_unhealthy();
    result
}
