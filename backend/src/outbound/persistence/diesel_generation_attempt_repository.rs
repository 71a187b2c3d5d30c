//! PostgreSQL-backed `GenerationAttemptRepository` implementation.
//!
//! The request id column is unique, so concurrent first submissions race on
//! `INSERT .. ON CONFLICT DO NOTHING` and both read back the single winner.
//! Leases are taken with a conditional `UPDATE`; the row lock Postgres holds
//! for the statement makes acquisition atomic across processes. Later writes
//! filter on the `runs` value granted with the lease.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ports::{GenerationAttemptRepository, GenerationAttemptRepositoryError};
use crate::domain::{AttemptId, GenerationAttempt, RequestId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{AttemptChanges, AttemptRow, NewAttemptRow, runs_column};
use super::pool::{DbPool, PoolError};
use super::schema::generation_attempts;

/// Diesel-backed persistence for generation attempts.
#[derive(Clone)]
pub struct DieselGenerationAttemptRepository {
    pool: DbPool,
}

impl DieselGenerationAttemptRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn write_changes(
        &self,
        attempt: &GenerationAttempt,
        changes: AttemptChanges,
    ) -> Result<(), GenerationAttemptRepositoryError> {
        use generation_attempts::dsl;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            dsl::generation_attempts
                .filter(dsl::id.eq(attempt.id.as_uuid()))
                .filter(dsl::runs.eq(runs_column(attempt.runs))),
        )
        .set(&changes)
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        if updated > 0 {
            return Ok(());
        }

        let exists: i64 = dsl::generation_attempts
            .filter(dsl::id.eq(attempt.id.as_uuid()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if exists == 0 {
            Err(GenerationAttemptRepositoryError::missing(attempt.id.to_string()))
        } else {
            debug!(
                attempt_id = %attempt.id,
                runs = attempt.runs,
                "write from superseded run refused"
            );
            Err(GenerationAttemptRepositoryError::lease_lost(attempt.id.to_string()))
        }
    }
}

fn map_pool_error(error: PoolError) -> GenerationAttemptRepositoryError {
    map_basic_pool_error(error, GenerationAttemptRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> GenerationAttemptRepositoryError {
    map_basic_diesel_error(
        error,
        GenerationAttemptRepositoryError::query,
        GenerationAttemptRepositoryError::connection,
    )
}

fn row_to_attempt(row: AttemptRow) -> Result<GenerationAttempt, GenerationAttemptRepositoryError> {
    row.into_domain()
        .map_err(GenerationAttemptRepositoryError::query)
}

#[async_trait]
impl GenerationAttemptRepository for DieselGenerationAttemptRepository {
    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<GenerationAttempt>, GenerationAttemptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = generation_attempts::table
            .filter(generation_attempts::request_id.eq(request_id.as_uuid()))
            .select(AttemptRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_attempt).transpose()
    }

    async fn insert_if_absent(
        &self,
        attempt: &GenerationAttempt,
    ) -> Result<GenerationAttempt, GenerationAttemptRepositoryError> {
        let new_row =
            NewAttemptRow::from_domain(attempt).map_err(GenerationAttemptRepositoryError::query)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let inserted = diesel::insert_into(generation_attempts::table)
            .values(&new_row)
            .on_conflict(generation_attempts::request_id)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if inserted == 0 {
            debug!(
                request_id = %attempt.request_id(),
                "attempt already recorded; reading stored row"
            );
        }

        let row: AttemptRow = generation_attempts::table
            .filter(generation_attempts::request_id.eq(attempt.request_id().as_uuid()))
            .select(AttemptRow::as_select())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_attempt(row)
    }

    async fn acquire_lease(
        &self,
        attempt_id: &AttemptId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<GenerationAttempt>, GenerationAttemptRepositoryError> {
        use generation_attempts::dsl;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let leased = diesel::update(
            dsl::generation_attempts
                .filter(dsl::id.eq(attempt_id.as_uuid()))
                .filter(dsl::lease_expires_at.is_null().or(dsl::lease_expires_at.le(now))),
        )
        .set((
            dsl::runs.eq(dsl::runs + 1),
            dsl::lease_expires_at.eq(Some(lease_until)),
            dsl::updated_at.eq(now),
        ))
        .returning(AttemptRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;

        if let Some(row) = leased {
            return row_to_attempt(row).map(Some);
        }

        let exists: i64 = dsl::generation_attempts
            .filter(dsl::id.eq(attempt_id.as_uuid()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if exists == 0 {
            return Err(GenerationAttemptRepositoryError::missing(
                attempt_id.to_string(),
            ));
        }
        Ok(None)
    }

    async fn save_progress(
        &self,
        attempt: &GenerationAttempt,
        lease_until: DateTime<Utc>,
    ) -> Result<(), GenerationAttemptRepositoryError> {
        let mut changes =
            AttemptChanges::from_domain(attempt).map_err(GenerationAttemptRepositoryError::query)?;
        changes.lease_expires_at = Some(lease_until);
        self.write_changes(attempt, changes).await
    }

    async fn close_attempt(
        &self,
        attempt: &GenerationAttempt,
    ) -> Result<(), GenerationAttemptRepositoryError> {
        let mut changes =
            AttemptChanges::from_domain(attempt).map_err(GenerationAttemptRepositoryError::query)?;
        changes.lease_expires_at = None;
        self.write_changes(attempt, changes).await
    }
}
