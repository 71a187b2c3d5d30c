//! Outbound adapters implementing the driven ports.
//!
//! - **memory**: process-local store for development and tests.
//! - **persistence**: PostgreSQL repositories using Diesel.
//! - **providers**: HTTP clients for text, moderation, and speech services,
//!   plus a keyword moderator.
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no pipeline logic.

pub mod memory;
pub mod persistence;
pub mod providers;
