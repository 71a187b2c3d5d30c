//! UUID-backed identifiers for users, children, requests, attempts, and
//! stories.
//!
//! Each identifier keeps the parsed [`Uuid`] alongside its canonical string
//! so adapters can borrow either form without reformatting.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation errors returned when parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierValidationError {
    /// The input string was empty.
    Empty { kind: &'static str },
    /// The input string was not a UUID.
    Invalid { kind: &'static str },
}

impl fmt::Display for IdentifierValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { kind } => write!(f, "{kind} must not be empty"),
            Self::Invalid { kind } => write!(f, "{kind} must be a valid UUID"),
        }
    }
}

impl std::error::Error for IdentifierValidationError {}

macro_rules! define_uuid_identifier {
    ($(#[$meta:meta])* $name:ident => $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid, String);

        impl $name {
            /// Validate and construct an identifier from borrowed input.
            pub fn new(id: impl AsRef<str>) -> Result<Self, IdentifierValidationError> {
                Self::from_owned(id.as_ref().to_owned())
            }

            /// Wrap an already-validated UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid, uuid.to_string())
            }

            /// Generate a new random identifier.
            pub fn random() -> Self {
                Self::from_uuid(Uuid::new_v4())
            }

            fn from_owned(id: String) -> Result<Self, IdentifierValidationError> {
                if id.is_empty() {
                    return Err(IdentifierValidationError::Empty { kind: $kind });
                }
                if id.trim() != id {
                    return Err(IdentifierValidationError::Invalid { kind: $kind });
                }
                let parsed = Uuid::parse_str(&id)
                    .map_err(|_| IdentifierValidationError::Invalid { kind: $kind })?;
                Ok(Self::from_uuid(parsed))
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.1.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_ref())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.1
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_owned(value)
            }
        }
    };
}

define_uuid_identifier!(
    /// Authenticated account that owns children and their stories.
    UserId => "user id"
);
define_uuid_identifier!(
    /// Child profile identifier.
    ChildId => "child id"
);
define_uuid_identifier!(
    /// Idempotency key for one story generation request.
    RequestId => "request id"
);
define_uuid_identifier!(
    /// Generation attempt record identifier.
    AttemptId => "attempt id"
);
define_uuid_identifier!(
    /// Persisted story identifier.
    StoryId => "story id"
);
