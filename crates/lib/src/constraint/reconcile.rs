use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ConstraintSet;
use crate::target::Address;

/// A constraint together with the target that declared it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
  pub origin: Address,
  pub constraint: ConstraintSet,
}

impl fmt::Display for Contribution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (from {})", self.constraint, self.origin)
  }
}

/// How much of the accumulated history a conflict reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictReporting {
  /// Every contributor merged so far.
  #[default]
  AllContributors,
  /// Only the first earlier contributor that is incompatible with the newcomer
  /// on its own. Falls back to all contributors when none is.
  FirstIncompatible,
}

/// An intersection that became empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
  pub accumulated: Vec<Contribution>,
  pub conflicting: Contribution,
}

impl fmt::Display for Conflict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.accumulated.is_empty() {
      return write!(f, "{} admits no version", self.conflicting);
    }
    let accumulated: Vec<String> = self.accumulated.iter().map(ToString::to_string).collect();
    write!(f, "{} conflicts with {}", accumulated.join(", "), self.conflicting)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
  #[error("unsatisfiable interpreter constraints: {0}")]
  UnsatisfiableConstraint(Conflict),
}

/// Running intersection of constraint contributions with provenance.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
  merged: ConstraintSet,
  contributions: Vec<Contribution>,
  reporting: ConflictReporting,
}

impl Reconciler {
  pub fn new(reporting: ConflictReporting) -> Self {
    Self {
      reporting,
      ..Self::default()
    }
  }

  /// Intersect `constraint` into the running set.
  ///
  /// On conflict the running set is left unchanged.
  pub fn add(&mut self, origin: &Address, constraint: &ConstraintSet) -> Result<(), Conflict> {
    let merged = self.merged.intersect(constraint);
    let contribution = Contribution {
      origin: origin.clone(),
      constraint: constraint.clone(),
    };

    if !merged.is_satisfiable() {
      return Err(self.conflict(contribution));
    }

    self.merged = merged;
    if !constraint.is_unconstrained() && !self.contributions.contains(&contribution) {
      self.contributions.push(contribution);
    }
    Ok(())
  }

  pub fn merged(&self) -> &ConstraintSet {
    &self.merged
  }

  pub fn contributions(&self) -> &[Contribution] {
    &self.contributions
  }

  pub fn into_parts(self) -> (ConstraintSet, Vec<Contribution>) {
    (self.merged, self.contributions)
  }

  fn conflict(&self, conflicting: Contribution) -> Conflict {
    let accumulated = match self.reporting {
      ConflictReporting::AllContributors => self.contributions.clone(),
      ConflictReporting::FirstIncompatible => self
        .contributions
        .iter()
        .find(|c| !c.constraint.intersect(&conflicting.constraint).is_satisfiable())
        .map(|c| vec![c.clone()])
        .unwrap_or_else(|| self.contributions.clone()),
    };
    Conflict {
      accumulated,
      conflicting,
    }
  }
}

/// Intersect the interpreter constraints of every closure member, in order.
///
/// Members without their own constraint contribute `default`.
pub fn reconcile_constraints<'a, I>(
  members: I,
  default: &ConstraintSet,
  reporting: ConflictReporting,
) -> Result<ConstraintSet, ReconcileError>
where
  I: IntoIterator<Item = (&'a Address, Option<&'a ConstraintSet>)>,
{
  let mut reconciler = Reconciler::new(reporting);
  for (address, constraint) in members {
    reconciler
      .add(address, constraint.unwrap_or(default))
      .map_err(ReconcileError::UnsatisfiableConstraint)?;
  }
  Ok(reconciler.into_parts().0)
}
