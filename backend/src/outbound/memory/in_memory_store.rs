//! Mutex-guarded store implementing the child, attempt, and story ports.
//!
//! All three ports share one lock so a story commit and the matching attempt
//! closure land together, mirroring the database transaction. Attempt writes
//! are fenced on the `runs` counter the same way the SQL updates are.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{
    ChildProfileRepository, ChildProfileRepositoryError, GenerationAttemptRepository,
    GenerationAttemptRepositoryError, StoryRepository, StoryRepositoryError,
};
use crate::domain::{
    AttemptId, AttemptState, Child, ChildId, ChildProfile, GenerationAttempt, RequestId, Story,
    StoryId, UserId,
};

#[derive(Default)]
struct StoreState {
    children: HashMap<ChildId, Child>,
    attempts: HashMap<RequestId, GenerationAttempt>,
    stories: HashMap<StoryId, Story>,
    stories_by_request: HashMap<RequestId, StoryId>,
}

impl StoreState {
    fn attempt_by_id_mut(&mut self, attempt_id: &AttemptId) -> Option<&mut GenerationAttempt> {
        self.attempts
            .values_mut()
            .find(|attempt| &attempt.id == attempt_id)
    }

    fn replace_attempt(
        &mut self,
        attempt: &GenerationAttempt,
        lease_expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), GenerationAttemptRepositoryError> {
        let stored = self
            .attempt_by_id_mut(&attempt.id)
            .ok_or_else(|| GenerationAttemptRepositoryError::missing(attempt.id.to_string()))?;
        if stored.runs != attempt.runs {
            return Err(GenerationAttemptRepositoryError::lease_lost(
                attempt.id.to_string(),
            ));
        }
        *stored = attempt.clone();
        stored.lease_expires_at = lease_expires_at;
        Ok(())
    }
}

/// Process-local store for children, attempts, and stories.
#[derive(Default)]
pub struct InMemoryStoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a child profile owned by `owner_id`.
    pub fn insert_child(&self, id: ChildId, owner_id: UserId, profile: ChildProfile) {
        if let Ok(mut state) = self.state.lock() {
            state.children.insert(
                id.clone(),
                Child {
                    id,
                    owner_id,
                    profile,
                },
            );
        }
    }

    /// Number of committed stories.
    pub fn story_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.stories.len())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, String> {
        self.state
            .lock()
            .map_err(|_| "in-memory store lock poisoned".to_owned())
    }
}

#[async_trait]
impl ChildProfileRepository for InMemoryStoryStore {
    async fn get_child_profile(
        &self,
        child_id: &ChildId,
        owner: &UserId,
    ) -> Result<ChildProfile, ChildProfileRepositoryError> {
        let state = self.lock().map_err(ChildProfileRepositoryError::query)?;
        let child = state
            .children
            .get(child_id)
            .ok_or_else(|| ChildProfileRepositoryError::not_found(child_id.to_string()))?;
        if !child.is_owned_by(owner) {
            return Err(ChildProfileRepositoryError::forbidden(child_id.to_string()));
        }
        Ok(child.profile.clone())
    }
}

#[async_trait]
impl GenerationAttemptRepository for InMemoryStoryStore {
    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<GenerationAttempt>, GenerationAttemptRepositoryError> {
        let state = self.lock().map_err(GenerationAttemptRepositoryError::query)?;
        Ok(state.attempts.get(request_id).cloned())
    }

    async fn insert_if_absent(
        &self,
        attempt: &GenerationAttempt,
    ) -> Result<GenerationAttempt, GenerationAttemptRepositoryError> {
        let mut state = self.lock().map_err(GenerationAttemptRepositoryError::query)?;
        Ok(state
            .attempts
            .entry(attempt.request_id().clone())
            .or_insert_with(|| attempt.clone())
            .clone())
    }

    async fn acquire_lease(
        &self,
        attempt_id: &AttemptId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<GenerationAttempt>, GenerationAttemptRepositoryError> {
        let mut state = self.lock().map_err(GenerationAttemptRepositoryError::query)?;
        let attempt = state
            .attempt_by_id_mut(attempt_id)
            .ok_or_else(|| GenerationAttemptRepositoryError::missing(attempt_id.to_string()))?;
        if attempt.is_leased_at(now) {
            return Ok(None);
        }
        attempt.lease_expires_at = Some(lease_until);
        attempt.runs = attempt.runs.saturating_add(1);
        Ok(Some(attempt.clone()))
    }

    async fn save_progress(
        &self,
        attempt: &GenerationAttempt,
        lease_until: DateTime<Utc>,
    ) -> Result<(), GenerationAttemptRepositoryError> {
        let mut state = self.lock().map_err(GenerationAttemptRepositoryError::query)?;
        state.replace_attempt(attempt, Some(lease_until))
    }

    async fn close_attempt(
        &self,
        attempt: &GenerationAttempt,
    ) -> Result<(), GenerationAttemptRepositoryError> {
        let mut state = self.lock().map_err(GenerationAttemptRepositoryError::query)?;
        state.replace_attempt(attempt, None)
    }
}

#[async_trait]
impl StoryRepository for InMemoryStoryStore {
    async fn commit_story(
        &self,
        story: &Story,
        attempt: &GenerationAttempt,
    ) -> Result<StoryId, StoryRepositoryError> {
        let mut state = self.lock().map_err(StoryRepositoryError::query)?;
        let story_id = match state.stories_by_request.get(story.request_id()) {
            Some(existing) => existing.clone(),
            None => story.id().clone(),
        };

        let mut closed = attempt.clone();
        closed.state = AttemptState::Succeeded {
            story_id: story_id.clone(),
        };
        state
            .replace_attempt(&closed, None)
            .map_err(|err| match err {
                GenerationAttemptRepositoryError::LeaseLost { attempt_id } => {
                    StoryRepositoryError::lease_lost(attempt_id)
                }
                other => StoryRepositoryError::query(other.to_string()),
            })?;

        if &story_id == story.id() {
            state
                .stories_by_request
                .insert(story.request_id().clone(), story_id.clone());
            state.stories.insert(story_id.clone(), story.clone());
        }
        Ok(story_id)
    }

    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Story>, StoryRepositoryError> {
        let state = self.lock().map_err(StoryRepositoryError::query)?;
        Ok(state
            .stories_by_request
            .get(request_id)
            .and_then(|story_id| state.stories.get(story_id))
            .cloned())
    }

    async fn find_by_id(&self, story_id: &StoryId) -> Result<Option<Story>, StoryRepositoryError> {
        let state = self.lock().map_err(StoryRepositoryError::query)?;
        Ok(state.stories.get(story_id).cloned())
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Story>, StoryRepositoryError> {
        let state = self.lock().map_err(StoryRepositoryError::query)?;
        let mut owned: Vec<Story> = state
            .stories
            .values()
            .filter(|story| story.owner_id() == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|story| std::cmp::Reverse(story.created_at()));
        Ok(owned)
    }
}
