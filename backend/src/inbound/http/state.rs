//! Shared HTTP adapter state.
//!
//! Handlers accept this via `actix_web::web::Data` and depend only on the
//! driving ports, so they stay testable without I/O.

use std::sync::Arc;

use crate::domain::ports::{
    FixtureStoryGenerationCommand, FixtureStoryGenerationQuery, StoryGenerationCommand,
    StoryGenerationQuery,
};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub stories: Arc<dyn StoryGenerationCommand>,
    pub story_queries: Arc<dyn StoryGenerationQuery>,
}

impl HttpState {
    pub fn new(
        stories: Arc<dyn StoryGenerationCommand>,
        story_queries: Arc<dyn StoryGenerationQuery>,
    ) -> Self {
        Self {
            stories,
            story_queries,
        }
    }
}

impl Default for HttpState {
    /// Fixture ports: submissions succeed instantly and lookups find nothing.
    fn default() -> Self {
        Self::new(
            Arc::new(FixtureStoryGenerationCommand),
            Arc::new(FixtureStoryGenerationQuery),
        )
    }
}
