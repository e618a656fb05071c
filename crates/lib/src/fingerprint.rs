//! Content fingerprints of package plans.
//!
//! A fingerprint is the SHA-256 of everything the assembler consumes. Equal
//! fingerprints therefore mean byte-identical artifacts, and any change that
//! would alter the artifact changes the fingerprint.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::closure::DependencyClosure;
use crate::consts::{FINGERPRINT_FORMAT, SHORT_FINGERPRINT_LEN};
use crate::constraint::ConstraintSet;
use crate::entry_point::ResolvedEntryPoint;
use crate::platform::PlatformTag;
use crate::target::{EnvVar, ExecutionMode};
use crate::util::hash::{ContentHash, HashError, Hashable};

/// 64 lowercase hex characters identifying a logical build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  /// Accepts exactly 64 lowercase hex characters.
  pub fn from_hex(hex: &str) -> Option<Self> {
    let valid = hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    valid.then(|| Self(hex.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Abbreviated form for logs.
  pub fn short(&self) -> &str {
    &self.0[..SHORT_FINGERPRINT_LEN.min(self.0.len())]
  }
}

impl From<ContentHash> for Fingerprint {
  fn from(hash: ContentHash) -> Self {
    Self(hash.0)
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The hashed view of a plan.
///
/// Files contribute through the closure content hash, requirements through
/// their exact pins, and platforms as a sorted set. Args and env keep their
/// declared order.
#[derive(Debug)]
pub struct FingerprintInput<'a> {
  pub closure: &'a DependencyClosure,
  pub constraints: &'a ConstraintSet,
  pub entry_point: &'a ResolvedEntryPoint,
  pub platforms: &'a BTreeSet<PlatformTag>,
  pub args: &'a [String],
  pub env: &'a [EnvVar],
  pub execution_mode: ExecutionMode,
  pub interpreter: &'a str,
  pub output_path: &'a str,
}

#[derive(Serialize)]
struct Hashed<'a> {
  format: u32,
  files: ContentHash,
  requirements: Vec<String>,
  constraints: String,
  entry_point: &'a ResolvedEntryPoint,
  platforms: &'a BTreeSet<PlatformTag>,
  args: &'a [String],
  env: &'a [EnvVar],
  execution_mode: ExecutionMode,
  interpreter: &'a str,
  output_path: &'a str,
}

impl Hashable for Hashed<'_> {}

impl FingerprintInput<'_> {
  pub fn compute(&self) -> Result<Fingerprint, HashError> {
    let hashed = Hashed {
      format: FINGERPRINT_FORMAT,
      files: self.closure.content_hash(),
      requirements: self.closure.pins(),
      constraints: self.constraints.to_string(),
      entry_point: self.entry_point,
      platforms: self.platforms,
      args: self.args,
      env: self.env,
      execution_mode: self.execution_mode,
      interpreter: self.interpreter,
      output_path: self.output_path,
    };
    Ok(hashed.content_hash()?.into())
  }
}
