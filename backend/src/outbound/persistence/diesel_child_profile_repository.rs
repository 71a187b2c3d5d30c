//! PostgreSQL-backed `ChildProfileRepository` implementation.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{ChildProfileRepository, ChildProfileRepositoryError};
use crate::domain::{ChildId, ChildProfile, UserId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::ChildRow;
use super::pool::{DbPool, PoolError};
use super::schema::children;

/// Diesel-backed read access to child profiles.
#[derive(Clone)]
pub struct DieselChildProfileRepository {
    pool: DbPool,
}

impl DieselChildProfileRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ChildProfileRepositoryError {
    map_basic_pool_error(error, ChildProfileRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> ChildProfileRepositoryError {
    map_basic_diesel_error(
        error,
        ChildProfileRepositoryError::query,
        ChildProfileRepositoryError::connection,
    )
}

#[async_trait]
impl ChildProfileRepository for DieselChildProfileRepository {
    async fn get_child_profile(
        &self,
        child_id: &ChildId,
        owner: &UserId,
    ) -> Result<ChildProfile, ChildProfileRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: ChildRow = children::table
            .filter(children::id.eq(child_id.as_uuid()))
            .select(ChildRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| ChildProfileRepositoryError::not_found(child_id.to_string()))?;

        if &row.owner_id != owner.as_uuid() {
            return Err(ChildProfileRepositoryError::forbidden(child_id.to_string()));
        }
        Ok(row.into_profile())
    }
}
