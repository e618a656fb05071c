//! Hashing utilities for content addressing and verification.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 hex digest
//! - `Hashable`: hashing of any serializable value through its JSON form
//! - `hash_bytes()`: arbitrary byte hashing
//! - `hash_entries()`: order-insensitive hashing of keyed entries

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type HashError = serde_json::Error;

/// A full 64-character SHA-256 hash.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Values hashed through their canonical JSON serialization.
///
/// Struct fields serialize in declaration order, so the hash is stable as long
/// as the type's layout is. Use ordered collections for anything set-like.
pub trait Hashable: Serialize {
  fn content_hash(&self) -> Result<ContentHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(hash_bytes(serialized.as_bytes()))
  }
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Hash a set of `(key, fields)` entries independent of the order they are given in.
///
/// Entries are sorted by key (then fields). Every entry and every field is
/// length-prefixed, so no choice of field content can make two different
/// entry sets feed the hasher the same bytes.
pub fn hash_entries<I>(entries: I) -> ContentHash
where
  I: IntoIterator<Item = (String, Vec<String>)>,
{
  let mut entries: Vec<(String, Vec<String>)> = entries.into_iter().collect();
  entries.sort();

  let mut hasher = Sha256::new();
  for (_, fields) in entries {
    hasher.update((fields.len() as u64).to_le_bytes());
    for field in fields {
      hasher.update((field.len() as u64).to_le_bytes());
      hasher.update(field.as_bytes());
    }
  }
  ContentHash(format!("{:x}", hasher.finalize()))
}
