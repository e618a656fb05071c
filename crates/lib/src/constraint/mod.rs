//! Version constraint sets.
//!
//! A [`ConstraintSet`] is the canonical conjunction of version predicates with
//! an optional runtime name, e.g. `CPython>=3.8,<4`. Parsing concatenates the
//! predicates and canonicalizes them into a lower bound, an upper bound and a
//! set of `!=` exclusions. Intersection is commutative, associative and
//! idempotent, and an unsatisfiable result is kept (with its predicates) so it
//! can be reported. Runtime names are case-insensitive and kept lowercase.

mod reconcile;
mod version;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use reconcile::{Conflict, ConflictReporting, Contribution, ReconcileError, Reconciler, reconcile_constraints};
pub use version::Version;

/// Errors raised while parsing versions and constraint expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
  #[error("invalid version '{0}'")]
  InvalidVersion(String),

  #[error("invalid constraint clause '{clause}': {reason}")]
  InvalidClause { clause: String, reason: String },
}

/// Comparison operators accepted in constraint clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
  Eq,
  NotEq,
  Ge,
  Gt,
  Le,
  Lt,
  Compatible,
}

impl Operator {
  // Longest tokens first so `>=` is not read as `>`.
  const TOKENS: [(&'static str, Operator); 7] = [
    ("~=", Operator::Compatible),
    ("==", Operator::Eq),
    ("!=", Operator::NotEq),
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    (">", Operator::Gt),
    ("<", Operator::Lt),
  ];

  fn split(clause: &str) -> Option<(Operator, &str)> {
    if clause.starts_with("===") {
      return None;
    }
    Self::TOKENS
      .iter()
      .find_map(|(token, op)| clause.strip_prefix(token).map(|rest| (*op, rest.trim())))
  }
}

/// One side of a version interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
  pub version: Version,
  pub inclusive: bool,
}

impl Bound {
  pub fn inclusive(version: Version) -> Self {
    Self {
      version,
      inclusive: true,
    }
  }

  pub fn exclusive(version: Version) -> Self {
    Self {
      version,
      inclusive: false,
    }
  }
}

fn tighter_lower(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
  match (a, b) {
    (None, other) | (other, None) => other,
    (Some(a), Some(b)) => Some(if a.version != b.version {
      if a.version > b.version { a } else { b }
    } else if !a.inclusive {
      a
    } else {
      b
    }),
  }
}

fn tighter_upper(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
  match (a, b) {
    (None, other) | (other, None) => other,
    (Some(a), Some(b)) => Some(if a.version != b.version {
      if a.version < b.version { a } else { b }
    } else if !a.inclusive {
      a
    } else {
      b
    }),
  }
}

/// Canonical conjunction of version predicates.
///
/// The empty set admits every version. Equality and hashing operate on the
/// canonical form, so two sets written differently but meaning the same thing
/// compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConstraintSet {
  runtimes: BTreeSet<String>,
  lower: Option<Bound>,
  upper: Option<Bound>,
  excluded: BTreeSet<Version>,
}

impl ConstraintSet {
  /// The unconstrained set.
  pub fn any() -> Self {
    Self::default()
  }

  pub fn runtimes(&self) -> &BTreeSet<String> {
    &self.runtimes
  }

  pub fn lower(&self) -> Option<&Bound> {
    self.lower.as_ref()
  }

  pub fn upper(&self) -> Option<&Bound> {
    self.upper.as_ref()
  }

  pub fn excluded(&self) -> &BTreeSet<Version> {
    &self.excluded
  }

  pub fn is_unconstrained(&self) -> bool {
    self.runtimes.is_empty() && self.lower.is_none() && self.upper.is_none() && self.excluded.is_empty()
  }

  /// Intersect two sets: tightest lower bound, tightest upper bound, union of
  /// exclusions inside the resulting interval, union of runtime names.
  pub fn intersect(&self, other: &Self) -> Self {
    let mut merged = Self {
      runtimes: self.runtimes.union(&other.runtimes).cloned().collect(),
      lower: tighter_lower(self.lower.clone(), other.lower.clone()),
      upper: tighter_upper(self.upper.clone(), other.upper.clone()),
      excluded: self.excluded.union(&other.excluded).cloned().collect(),
    };
    merged.canonicalize();
    merged
  }

  /// Whether any version (for a single runtime) satisfies every predicate.
  pub fn is_satisfiable(&self) -> bool {
    if self.runtimes.len() > 1 {
      return false;
    }
    match (&self.lower, &self.upper) {
      (Some(lower), Some(upper)) => {
        if lower.version < upper.version {
          true
        } else if lower.version == upper.version {
          lower.inclusive && upper.inclusive && !self.excluded.contains(&lower.version)
        } else {
          false
        }
      }
      _ => true,
    }
  }

  /// Whether `version` satisfies the version predicates. Runtime names are
  /// not consulted.
  pub fn admits(&self, version: &Version) -> bool {
    self.within_bounds(version) && !self.excluded.contains(version)
  }

  /// Whether a concrete runtime at `version` satisfies the set.
  pub fn admits_runtime(&self, runtime: &str, version: &Version) -> bool {
    self.runtimes.iter().all(|name| name.eq_ignore_ascii_case(runtime)) && self.admits(version)
  }

  fn within_bounds(&self, version: &Version) -> bool {
    let above = match &self.lower {
      Some(bound) => version > &bound.version || (bound.inclusive && version == &bound.version),
      None => true,
    };
    let below = match &self.upper {
      Some(bound) => version < &bound.version || (bound.inclusive && version == &bound.version),
      None => true,
    };
    above && below
  }

  fn canonicalize(&mut self) {
    let excluded = std::mem::take(&mut self.excluded);
    self.excluded = excluded.into_iter().filter(|v| self.within_bounds(v)).collect();
  }

  fn apply(&mut self, op: Operator, raw: &str, clause: &str) -> Result<(), ConstraintError> {
    let invalid = |reason: &str| ConstraintError::InvalidClause {
      clause: clause.to_string(),
      reason: reason.to_string(),
    };

    if let Some(prefix) = raw.strip_suffix(".*") {
      if op != Operator::Eq {
        return Err(invalid("wildcards are only supported with '=='"));
      }
      let components = Version::parse_components(prefix)?;
      let lower = Bound::inclusive(Version::from_components(components.clone()));
      let upper = Version::next_prefix(&components, components.len())
        .ok_or_else(|| invalid("version component out of range"))?;
      let upper = Bound::exclusive(upper);
      self.lower = tighter_lower(self.lower.take(), Some(lower));
      self.upper = tighter_upper(self.upper.take(), Some(upper));
      return Ok(());
    }

    let components = Version::parse_components(raw)?;
    let version = Version::from_components(components.clone());
    match op {
      Operator::Eq => {
        self.lower = tighter_lower(self.lower.take(), Some(Bound::inclusive(version.clone())));
        self.upper = tighter_upper(self.upper.take(), Some(Bound::inclusive(version)));
      }
      Operator::NotEq => {
        self.excluded.insert(version);
      }
      Operator::Ge => self.lower = tighter_lower(self.lower.take(), Some(Bound::inclusive(version))),
      Operator::Gt => self.lower = tighter_lower(self.lower.take(), Some(Bound::exclusive(version))),
      Operator::Le => self.upper = tighter_upper(self.upper.take(), Some(Bound::inclusive(version))),
      Operator::Lt => self.upper = tighter_upper(self.upper.take(), Some(Bound::exclusive(version))),
      Operator::Compatible => {
        if components.len() < 2 {
          return Err(invalid("'~=' needs at least two version components"));
        }
        let upper = Version::next_prefix(&components, components.len() - 1)
          .ok_or_else(|| invalid("version component out of range"))?;
        self.lower = tighter_lower(self.lower.take(), Some(Bound::inclusive(version)));
        self.upper = tighter_upper(self.upper.take(), Some(Bound::exclusive(upper)));
      }
    }
    Ok(())
  }
}

impl FromStr for ConstraintSet {
  type Err = ConstraintError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let mut set = ConstraintSet::default();
    if s.is_empty() || s == "*" {
      return Ok(set);
    }

    for clause in s.split(',').map(str::trim) {
      if clause.is_empty() {
        return Err(ConstraintError::InvalidClause {
          clause: s.to_string(),
          reason: "empty clause".to_string(),
        });
      }

      let runtime_len = if clause.starts_with(|c: char| c.is_ascii_alphabetic()) {
        clause
          .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
          .unwrap_or(clause.len())
      } else {
        0
      };
      let (runtime, rest) = clause.split_at(runtime_len);
      let rest = rest.trim();
      if !runtime.is_empty() {
        set.runtimes.insert(runtime.to_ascii_lowercase());
      }
      if rest.is_empty() {
        continue;
      }

      let (op, raw) = Operator::split(rest).ok_or_else(|| ConstraintError::InvalidClause {
        clause: clause.to_string(),
        reason: "expected one of ==, !=, >=, >, <=, <, ~=".to_string(),
      })?;
      set.apply(op, raw, clause)?;
    }

    set.canonicalize();
    Ok(set)
  }
}

impl fmt::Display for ConstraintSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut clauses: Vec<String> = Vec::new();
    match (&self.lower, &self.upper) {
      (Some(lower), Some(upper)) if lower == upper && lower.inclusive => {
        clauses.push(format!("=={}", lower.version));
      }
      _ => {
        if let Some(lower) = &self.lower {
          let op = if lower.inclusive { ">=" } else { ">" };
          clauses.push(format!("{op}{}", lower.version));
        }
        if let Some(upper) = &self.upper {
          let op = if upper.inclusive { "<=" } else { "<" };
          clauses.push(format!("{op}{}", upper.version));
        }
      }
    }
    for version in &self.excluded {
      clauses.push(format!("!={version}"));
    }

    let mut runtimes = self.runtimes.iter();
    if let Some(first) = runtimes.next() {
      match clauses.first_mut() {
        Some(clause) => clause.insert_str(0, first),
        None => clauses.push(first.clone()),
      }
    }
    clauses.extend(runtimes.cloned());

    if clauses.is_empty() {
      return f.write_str("*");
    }
    f.write_str(&clauses.join(","))
  }
}

impl TryFrom<String> for ConstraintSet {
  type Error = ConstraintError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ConstraintSet> for String {
  fn from(value: ConstraintSet) -> Self {
    value.to_string()
  }
}
