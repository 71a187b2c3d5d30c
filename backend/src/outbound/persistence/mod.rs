//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Repositories translate between Diesel rows and domain types and hold no
//! business logic. Row structs (`models.rs`) and the table definitions
//! (`schema.rs`) never leave this module.
//!
//! ```ignore
//! use lullaby_backend::outbound::persistence::{DbPool, DieselStoryRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/lullaby")).await?;
//! let stories = DieselStoryRepository::new(pool);
//! ```

mod diesel_basic_error_mapping;
mod diesel_child_profile_repository;
mod diesel_generation_attempt_repository;
mod diesel_story_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_child_profile_repository::DieselChildProfileRepository;
pub use diesel_generation_attempt_repository::DieselGenerationAttemptRepository;
pub use diesel_story_repository::DieselStoryRepository;
pub use migrations::{MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
