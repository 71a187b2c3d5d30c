//! In-process storage adapters.
//!
//! Used by the `memory` storage mode for local development and by the
//! pipeline's behavioural tests. State lives for the lifetime of the process.

mod in_memory_store;

pub use in_memory_store::InMemoryStoryStore;
