//! Child profile snapshot used as read-only input to prompt construction.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ChildId, UserId};

/// Optional descriptive attributes of a child.
///
/// Every field may be absent. The prompt builder substitutes placeholders for
/// missing values so incomplete profiles never block generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Mira")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 6)]
    pub age: Option<u8>,
    /// Free-text pronoun hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub favorite_characters: Vec<String>,
}

/// A stored child record: the profile plus its owning user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub id: ChildId,
    pub owner_id: UserId,
    pub profile: ChildProfile,
}

impl Child {
    /// Return whether `user` owns this child.
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_id == user
    }
}
