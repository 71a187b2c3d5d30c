//! Driven port for persisting generation attempts and their leases.
//!
//! The lease columns provide mutual exclusion across processes: a run may
//! only advance an attempt while it holds an unexpired lease. The `runs`
//! counter doubles as a fencing token: every write carries the value the
//! run was granted, and a write from an older run is refused with
//! [`GenerationAttemptRepositoryError::LeaseLost`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::{AttemptId, GenerationAttempt, RequestId};

define_port_error! {
    /// Errors raised by attempt persistence adapters.
    pub enum GenerationAttemptRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "attempt repository connection failed: {message}",
        /// Query or mapping failed during execution.
        Query { message: String } => "attempt repository query failed: {message}",
        /// The attempt targeted by an update does not exist.
        Missing { attempt_id: String } => "attempt {attempt_id} does not exist",
        /// A newer run holds the attempt; the write was discarded.
        LeaseLost { attempt_id: String } => "attempt {attempt_id} is owned by a newer run",
    }
}

/// Persistence for [`GenerationAttempt`] records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationAttemptRepository: Send + Sync {
    /// Look up the attempt for `request_id`.
    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<GenerationAttempt>, GenerationAttemptRepositoryError>;

    /// Insert `attempt` unless one already exists for its request id, and
    /// return whichever record is stored.
    async fn insert_if_absent(
        &self,
        attempt: &GenerationAttempt,
    ) -> Result<GenerationAttempt, GenerationAttemptRepositoryError>;

    /// Take the lease on `attempt_id` if it is free or expired at `now`.
    ///
    /// On success the stored `runs` counter is incremented and the updated
    /// record is returned. `None` means another run holds the lease.
    async fn acquire_lease(
        &self,
        attempt_id: &AttemptId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<GenerationAttempt>, GenerationAttemptRepositoryError>;

    /// Checkpoint state, stage outputs, and transitions, extending the lease.
    ///
    /// Fails with `LeaseLost` when `attempt.runs` no longer matches the
    /// stored counter.
    async fn save_progress(
        &self,
        attempt: &GenerationAttempt,
        lease_until: DateTime<Utc>,
    ) -> Result<(), GenerationAttemptRepositoryError>;

    /// Write a closed or failed state and release the lease, under the same
    /// fencing rule as [`Self::save_progress`].
    async fn close_attempt(
        &self,
        attempt: &GenerationAttempt,
    ) -> Result<(), GenerationAttemptRepositoryError>;
}
