//! Third-party requirements: specifiers as declared by targets and the locked
//! records they resolve to.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constraint::{ConstraintError, ConstraintSet, Version};
use crate::platform::PlatformTag;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
  #[error("invalid requirement '{spec}': {reason}")]
  Invalid { spec: String, reason: String },

  #[error("invalid requirement '{spec}': {source}")]
  Constraint {
    spec: String,
    #[source]
    source: ConstraintError,
  },
}

/// Normalize a distribution name: lowercase, with runs of `-`, `_` and `.`
/// collapsed to a single `-`.
pub fn canonical_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut in_separator = false;
  for c in name.trim().chars() {
    if matches!(c, '-' | '_' | '.') {
      if !in_separator {
        out.push('-');
      }
      in_separator = true;
    } else {
      out.push(c.to_ascii_lowercase());
      in_separator = false;
    }
  }
  out
}

/// A requirement as a target declares it, e.g. `requests>=2.31,<3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequirementSpec {
  pub name: String,
  pub constraint: ConstraintSet,
}

impl RequirementSpec {
  pub fn canonical_name(&self) -> String {
    canonical_name(&self.name)
  }
}

impl FromStr for RequirementSpec {
  type Err = RequirementError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let spec = s.trim();
    let invalid = |reason: &str| RequirementError::Invalid {
      spec: spec.to_string(),
      reason: reason.to_string(),
    };

    if spec.contains(';') {
      return Err(invalid("environment markers are not supported"));
    }
    if spec.contains('[') {
      return Err(invalid("extras are not supported"));
    }

    let name_len = spec
      .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
      .unwrap_or(spec.len());
    let (name, rest) = spec.split_at(name_len);
    if name.is_empty() || !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
      return Err(invalid("missing distribution name"));
    }

    let constraint = rest.parse().map_err(|source| RequirementError::Constraint {
      spec: spec.to_string(),
      source,
    })?;
    Ok(Self {
      name: name.to_string(),
      constraint,
    })
  }
}

impl fmt::Display for RequirementSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.constraint.is_unconstrained() {
      write!(f, "{}", self.name)
    } else {
      write!(f, "{}{}", self.name, self.constraint)
    }
  }
}

impl TryFrom<String> for RequirementSpec {
  type Error = RequirementError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<RequirementSpec> for String {
  fn from(value: RequirementSpec) -> Self {
    value.to_string()
  }
}

/// A locked distribution: the exact version a requirement resolves to and
/// what it provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRequirement {
  pub name: String,
  pub version: Version,
  /// Contains compiled code and therefore needs a per-platform build.
  #[serde(default)]
  pub native: bool,
  /// Platforms with a prebuilt artifact available. Only meaningful when `native`.
  #[serde(default)]
  pub platforms: BTreeSet<PlatformTag>,
  /// Console scripts the distribution installs.
  #[serde(default)]
  pub scripts: BTreeSet<String>,
}

impl ResolvedRequirement {
  pub fn pure(name: impl Into<String>, version: Version) -> Self {
    Self {
      name: name.into(),
      version,
      native: false,
      platforms: BTreeSet::new(),
      scripts: BTreeSet::new(),
    }
  }

  pub fn native<I>(name: impl Into<String>, version: Version, platforms: I) -> Self
  where
    I: IntoIterator<Item = PlatformTag>,
  {
    Self {
      native: true,
      platforms: platforms.into_iter().collect(),
      ..Self::pure(name, version)
    }
  }

  pub fn with_scripts<I, S>(mut self, scripts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.scripts.extend(scripts.into_iter().map(Into::into));
    self
  }

  pub fn canonical_name(&self) -> String {
    canonical_name(&self.name)
  }

  /// `name==version`, with the canonical name.
  pub fn pin(&self) -> String {
    format!("{}=={}", self.canonical_name(), self.version)
  }

  pub fn has_prebuilt(&self, platform: &PlatformTag) -> bool {
    !self.native || self.platforms.contains(platform)
  }

  pub fn provides_script(&self, script: &str) -> bool {
    self.scripts.contains(script)
  }
}

/// Maps a canonical requirement name to the locked record for it.
pub trait RequirementResolver {
  fn resolve(&self, canonical_name: &str) -> Option<ResolvedRequirement>;
}

/// An in-memory lock: one record per canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedRequirements {
  entries: BTreeMap<String, ResolvedRequirement>,
}

impl LockedRequirements {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a record, returning the one it replaced.
  pub fn insert(&mut self, requirement: ResolvedRequirement) -> Option<ResolvedRequirement> {
    self.entries.insert(requirement.canonical_name(), requirement)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ResolvedRequirement> {
    self.entries.values()
  }
}

impl FromIterator<ResolvedRequirement> for LockedRequirements {
  fn from_iter<T: IntoIterator<Item = ResolvedRequirement>>(iter: T) -> Self {
    let mut lock = Self::new();
    for requirement in iter {
      lock.insert(requirement);
    }
    lock
  }
}

impl RequirementResolver for LockedRequirements {
  fn resolve(&self, canonical_name: &str) -> Option<ResolvedRequirement> {
    self.entries.get(canonical_name).cloned()
  }
}
