//! PostgreSQL-backed `StoryRepository` implementation.
//!
//! `commit_story` inserts the story and closes its attempt inside one
//! transaction. The unique request id on `stories` makes a losing concurrent
//! commit a no-op that reads back the winner's identifier. The attempt update
//! is fenced on `runs`; a superseded run rolls the whole transaction back.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{StoryRepository, StoryRepositoryError};
use crate::domain::{GenerationAttempt, RequestId, Story, StoryId, UserId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{AttemptChanges, NewStoryRow, StoryRow, runs_column};
use super::pool::{DbPool, PoolError};
use super::schema::{generation_attempts, stories};

/// Diesel-backed persistence for committed stories.
#[derive(Clone)]
pub struct DieselStoryRepository {
    pool: DbPool,
}

impl DieselStoryRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> StoryRepositoryError {
    map_basic_pool_error(error, StoryRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> StoryRepositoryError {
    map_basic_diesel_error(
        error,
        StoryRepositoryError::query,
        StoryRepositoryError::connection,
    )
}

/// Transaction failure: a database error or a lost lease.
#[derive(Debug)]
enum CommitError {
    Diesel(diesel::result::Error),
    LeaseLost,
}

impl From<diesel::result::Error> for CommitError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

fn row_to_story(row: StoryRow) -> Result<Story, StoryRepositoryError> {
    row.into_domain().map_err(StoryRepositoryError::query)
}

#[async_trait]
impl StoryRepository for DieselStoryRepository {
    async fn commit_story(
        &self,
        story: &Story,
        attempt: &GenerationAttempt,
    ) -> Result<StoryId, StoryRepositoryError> {
        let new_row = NewStoryRow::from_domain(story).map_err(StoryRepositoryError::query)?;
        let mut changes =
            AttemptChanges::from_domain(attempt).map_err(StoryRepositoryError::query)?;
        changes.lease_expires_at = None;
        let request_id = *story.request_id().as_uuid();
        let attempt_id = *attempt.id.as_uuid();
        let fence = runs_column(attempt.runs);

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let story_id: Uuid = conn
            .transaction(|conn| {
                async move {
                    let inserted = diesel::insert_into(stories::table)
                        .values(&new_row)
                        .on_conflict(stories::request_id)
                        .do_nothing()
                        .execute(conn)
                        .await?;
                    let story_id: Uuid = stories::table
                        .filter(stories::request_id.eq(request_id))
                        .select(stories::id)
                        .first(conn)
                        .await?;
                    if inserted == 0 {
                        debug!(%request_id, %story_id, "story already committed for request");
                    }

                    changes.status = "succeeded".to_owned();
                    changes.story_id = Some(story_id);
                    let closed = diesel::update(
                        generation_attempts::table
                            .filter(generation_attempts::id.eq(attempt_id))
                            .filter(generation_attempts::runs.eq(fence)),
                    )
                    .set(&changes)
                    .execute(conn)
                    .await?;
                    if closed == 0 {
                        return Err(CommitError::LeaseLost);
                    }
                    Ok::<_, CommitError>(story_id)
                }
                .scope_boxed()
            })
            .await
            .map_err(|error| match error {
                CommitError::Diesel(error) => map_diesel_error(error),
                CommitError::LeaseLost => StoryRepositoryError::lease_lost(attempt_id.to_string()),
            })?;

        Ok(StoryId::from_uuid(story_id))
    }

    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Story>, StoryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = stories::table
            .filter(stories::request_id.eq(request_id.as_uuid()))
            .select(StoryRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_story).transpose()
    }

    async fn find_by_id(&self, story_id: &StoryId) -> Result<Option<Story>, StoryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = stories::table
            .find(story_id.as_uuid())
            .select(StoryRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_story).transpose()
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Story>, StoryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<StoryRow> = stories::table
            .filter(stories::owner_id.eq(owner.as_uuid()))
            .order((stories::created_at.desc(), stories::id.desc()))
            .select(StoryRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_story).collect()
    }
}
