//! Driven port for reading child profiles owned by a user.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{ChildId, ChildProfile, UserId};

define_port_error! {
    /// Errors raised when loading a child profile.
    pub enum ChildProfileRepositoryError {
        /// No child exists with the given identifier.
        NotFound { child_id: String } => "child {child_id} not found",
        /// The child belongs to a different user.
        Forbidden { child_id: String } => "child {child_id} is owned by another user",
        /// Repository connection could not be established.
        Connection { message: String } => "child profile repository connection failed: {message}",
        /// Query or mapping failed during execution.
        Query { message: String } => "child profile repository query failed: {message}",
    }
}

/// Read-only access to child profiles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChildProfileRepository: Send + Sync {
    /// Load the profile of `child_id`, checking that `owner` owns it.
    async fn get_child_profile(
        &self,
        child_id: &ChildId,
        owner: &UserId,
    ) -> Result<ChildProfile, ChildProfileRepositoryError>;
}
