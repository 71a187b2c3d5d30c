//! SHA-256 fingerprints of canonicalised request payloads.
//!
//! A resubmitted request id must carry the same payload as the original
//! submission. Payloads are canonicalised before hashing so key order and
//! whitespace never change the fingerprint:
//!
//! 1. Object keys are sorted recursively.
//! 2. Arrays keep their element order.
//! 3. The result is serialised to compact JSON and hashed.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Errors raised while building or decoding a [`PayloadHash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadHashError {
    #[error("payload hash must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("failed to serialise canonical JSON payload: {message}")]
    Serialization { message: String },
}

/// SHA-256 hash of a canonical request payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadHash([u8; 32]);

impl PayloadHash {
    /// Construct a hash from a 32-byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Construct a hash from a byte slice loaded from storage.
    ///
    /// # Examples
    /// ```
    /// use lullaby_backend::domain::PayloadHash;
    ///
    /// assert!(PayloadHash::try_from_bytes(&[0_u8; 32]).is_ok());
    /// assert!(PayloadHash::try_from_bytes(&[0_u8; 8]).is_err());
    /// ```
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, PayloadHashError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PayloadHashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hexadecimal form used in logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonicalise `value` and compute its SHA-256 fingerprint.
///
/// # Examples
/// ```
/// use lullaby_backend::domain::canonicalize_and_hash;
/// use serde_json::json;
///
/// let a = canonicalize_and_hash(&json!({"moral": "honesty", "friendName": "Theo"}))
///     .expect("hash");
/// let b = canonicalize_and_hash(&json!({"friendName": "Theo", "moral": "honesty"}))
///     .expect("hash");
/// assert_eq!(a, b);
/// ```
pub fn canonicalize_and_hash(value: &Value) -> Result<PayloadHash, PayloadHashError> {
    let bytes = serde_json::to_vec(&canonicalize(value)).map_err(|err| {
        PayloadHashError::Serialization {
            message: err.to_string(),
        }
    })?;
    Ok(PayloadHash(Sha256::digest(&bytes).into()))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, inner)| (key.clone(), canonicalize(inner)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
