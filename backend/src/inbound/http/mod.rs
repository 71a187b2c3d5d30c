//! HTTP inbound adapter exposing the story endpoints and health checks.

pub mod error;
pub mod health;
pub mod idempotency;
pub mod session;
pub mod state;
pub mod stories;
#[cfg(test)]
pub mod test_utils;

pub use error::ApiResult;
