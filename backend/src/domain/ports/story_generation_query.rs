//! Driving port for polling attempts and reading stories.

use async_trait::async_trait;

use super::GenerationOutcome;
use crate::domain::{Error, RequestId, Story, StoryId, UserId};

/// Read-side operations for story generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoryGenerationQuery: Send + Sync {
    /// Current status of the attempt for `request_id`, owned by `owner`.
    async fn attempt_status(
        &self,
        owner: &UserId,
        request_id: &RequestId,
    ) -> Result<GenerationOutcome, Error>;

    /// Load a story owned by `owner`.
    async fn get_story(&self, owner: &UserId, story_id: &StoryId) -> Result<Story, Error>;

    /// Every story owned by `owner`, newest first.
    async fn list_stories(&self, owner: &UserId) -> Result<Vec<Story>, Error>;
}

/// Fixture query that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureStoryGenerationQuery;

#[async_trait]
impl StoryGenerationQuery for FixtureStoryGenerationQuery {
    async fn attempt_status(
        &self,
        _owner: &UserId,
        request_id: &RequestId,
    ) -> Result<GenerationOutcome, Error> {
        Err(Error::not_found(format!(
            "no story generation for request {request_id}"
        )))
    }

    async fn get_story(&self, _owner: &UserId, story_id: &StoryId) -> Result<Story, Error> {
        Err(Error::not_found(format!("story {story_id} not found")))
    }

    async fn list_stories(&self, _owner: &UserId) -> Result<Vec<Story>, Error> {
        Ok(Vec::new())
    }
}
