use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConstraintError;

/// A dotted numeric release version such as `3.8` or `1.26.4`.
///
/// Trailing zero components are not significant: `3.8`, `3.8.0` and `3.8.0.0`
/// compare equal and are stored in the trimmed form. At least one component is
/// always kept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(Vec<u64>);

impl Version {
  /// Build a version from raw components, trimming trailing zeros.
  pub fn from_components(mut components: Vec<u64>) -> Self {
    while components.len() > 1 && components.last() == Some(&0) {
      components.pop();
    }
    if components.is_empty() {
      components.push(0);
    }
    Self(components)
  }

  pub fn components(&self) -> &[u64] {
    &self.0
  }

  /// Parse the untrimmed components of a version string.
  ///
  /// Operators like `~=` and `==X.*` depend on how many components were
  /// written, so callers that care use this instead of [`Version::from_str`].
  pub(crate) fn parse_components(raw: &str) -> Result<Vec<u64>, ConstraintError> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if raw.is_empty() {
      return Err(ConstraintError::InvalidVersion(raw.to_string()));
    }
    raw
      .split('.')
      .map(|part| {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
          return Err(ConstraintError::InvalidVersion(raw.to_string()));
        }
        part
          .parse::<u64>()
          .map_err(|_| ConstraintError::InvalidVersion(raw.to_string()))
      })
      .collect()
  }

  /// The smallest version greater than every version sharing the first
  /// `len` components of `components`: `[1, 4, 2]` with `len = 2` is `1.5`.
  ///
  /// Returns `None` when the bumped component would overflow.
  pub(crate) fn next_prefix(components: &[u64], len: usize) -> Option<Self> {
    let mut prefix: Vec<u64> = components.iter().copied().take(len).collect();
    if let Some(last) = prefix.last_mut() {
      *last = last.checked_add(1)?;
    }
    Some(Self::from_components(prefix))
  }
}

impl FromStr for Version {
  type Err = ConstraintError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::from_components(Self::parse_components(s)?))
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for component in &self.0 {
      if !first {
        f.write_str(".")?;
      }
      write!(f, "{component}")?;
      first = false;
    }
    Ok(())
  }
}

impl TryFrom<String> for Version {
  type Error = ConstraintError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Version> for String {
  fn from(value: Version) -> Self {
    value.to_string()
  }
}
