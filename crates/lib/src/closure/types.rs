use std::sync::Arc;

use thiserror::Error;

use crate::constraint::{Conflict, ConstraintSet, Contribution, Version};
use crate::requirement::{ResolvedRequirement, canonical_name};
use crate::target::Address;
use crate::util::hash::{ContentHash, hash_entries};

/// Errors that can occur while computing a dependency closure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClosureError {
  #[error("dependency cycle: {}", render_cycle(.cycle))]
  Cycle { cycle: Vec<Address> },

  #[error("unknown target {address}{}", render_referrer(.referenced_from))]
  UnknownTarget {
    address: Address,
    referenced_from: Option<Address>,
  },

  #[error("unsatisfiable requirement '{name}': {conflict}")]
  UnsatisfiableRequirement { name: String, conflict: Conflict },

  #[error("requirement '{name}' has no locked version (required by {})", render_addresses(.required_by))]
  UnlockedRequirement { name: String, required_by: Vec<Address> },

  #[error("locked version {name}=={version} does not satisfy {constraint}")]
  LockedVersionRejected {
    name: String,
    version: Version,
    constraint: ConstraintSet,
  },

  #[error("cannot read source {path} of {owner}: {message}")]
  SourceUnavailable {
    path: String,
    owner: Address,
    message: String,
  },

  #[error("{first} and {second} both map to archive path {archive_path}")]
  ArchivePathCollision {
    archive_path: String,
    first: String,
    second: String,
  },
}

fn render_cycle(cycle: &[Address]) -> String {
  render_joined(cycle, " -> ")
}

fn render_addresses(addresses: &[Address]) -> String {
  render_joined(addresses, ", ")
}

fn render_joined(addresses: &[Address], separator: &str) -> String {
  addresses.iter().map(ToString::to_string).collect::<Vec<_>>().join(separator)
}

fn render_referrer(referrer: &Option<Address>) -> String {
  referrer
    .as_ref()
    .map(|r| format!(" (referenced from {r})"))
    .unwrap_or_default()
}

/// A first-party file in the closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureFile {
  /// Project-relative path.
  pub path: String,
  /// Path inside the artifact, relative to the owning source root.
  pub archive_path: String,
  pub owner: Address,
  pub digest: ContentHash,
  pub content: Arc<[u8]>,
}

/// A third-party requirement merged across the closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureRequirement {
  /// Canonical name.
  pub name: String,
  /// Intersection of every contributing specifier.
  pub constraint: ConstraintSet,
  pub contributions: Vec<Contribution>,
  pub resolved: ResolvedRequirement,
}

/// Everything a target transitively needs.
///
/// Targets are in breadth-first discovery order starting at the root. Files
/// and requirements are deduplicated and kept in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyClosure {
  pub root: Address,
  pub targets: Vec<Address>,
  pub files: Vec<ClosureFile>,
  pub requirements: Vec<ClosureRequirement>,
}

impl DependencyClosure {
  pub fn contains_target(&self, address: &Address) -> bool {
    self.targets.contains(address)
  }

  pub fn file(&self, path: &str) -> Option<&ClosureFile> {
    self.files.iter().find(|f| f.path == path)
  }

  pub fn contains_file(&self, path: &str) -> bool {
    self.file(path).is_some()
  }

  /// Look up a requirement by any spelling of its name.
  pub fn requirement(&self, name: &str) -> Option<&ClosureRequirement> {
    let name = canonical_name(name);
    self.requirements.iter().find(|r| r.name == name)
  }

  /// `name==version` pins sorted by name.
  pub fn pins(&self) -> Vec<String> {
    let mut pins: Vec<String> = self.requirements.iter().map(|r| r.resolved.pin()).collect();
    pins.sort();
    pins
  }

  /// Hash of every file's path, archive path and content digest.
  ///
  /// Independent of discovery order.
  pub fn content_hash(&self) -> ContentHash {
    hash_entries(self.files.iter().map(|file| {
      (
        file.path.clone(),
        vec![file.path.clone(), file.archive_path.clone(), file.digest.0.clone()],
      )
    }))
  }

  pub fn total_bytes(&self) -> usize {
    self.files.iter().map(|f| f.content.len()).sum()
  }
}
