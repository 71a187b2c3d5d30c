//! Driven port for committing and reading stories.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{GenerationAttempt, RequestId, Story, StoryId, UserId};

define_port_error! {
    /// Errors raised by story persistence adapters.
    pub enum StoryRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "story repository connection failed: {message}",
        /// Query or mapping failed during execution.
        Query { message: String } => "story repository query failed: {message}",
        /// A newer run holds the attempt; nothing was committed.
        LeaseLost { attempt_id: String } => "attempt {attempt_id} is owned by a newer run",
    }
}

/// Persistence for [`Story`] records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoryRepository: Send + Sync {
    /// Persist `story` and close `attempt` as succeeded in one atomic unit.
    ///
    /// When a story already exists for the request id, nothing is inserted
    /// and the existing identifier is returned; the attempt is closed against
    /// that identifier instead. Fails with `LeaseLost`, committing nothing,
    /// when `attempt.runs` no longer matches the stored counter.
    async fn commit_story(
        &self,
        story: &Story,
        attempt: &GenerationAttempt,
    ) -> Result<StoryId, StoryRepositoryError>;

    /// Find the story committed for `request_id`.
    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Story>, StoryRepositoryError>;

    /// Find a story by identifier.
    async fn find_by_id(&self, story_id: &StoryId) -> Result<Option<Story>, StoryRepositoryError>;

    /// Stories owned by `owner`, newest first.
    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Story>, StoryRepositoryError>;
}
