//! Engine configuration.

use tracing::warn;

use crate::consts::{DEFAULT_INTERPRETER, HOST_PLATFORM_ENV};
use crate::constraint::{ConflictReporting, ConstraintSet};
use crate::entry_point::EntryPointPrecedence;
use crate::platform::{PlatformError, PlatformTag};

/// Knobs for [`Packager`](crate::package::Packager).
#[derive(Debug, Clone, PartialEq)]
pub struct PackageConfig {
  /// Maximum number of artifacts assembled in parallel.
  pub parallelism: usize,

  /// Overrides host platform detection.
  pub host_platform: Option<PlatformTag>,

  /// Interpreter constraint for targets that declare none.
  pub default_constraints: ConstraintSet,

  /// How much of the accumulated state a constraint conflict reports.
  pub conflict_reporting: ConflictReporting,

  /// Which of `entry_point` and `script` wins when a target sets both.
  pub entry_point_precedence: EntryPointPrecedence,

  /// Interpreter named in the zipapp `#!` line.
  pub interpreter: String,
}

impl Default for PackageConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      host_platform: None,
      default_constraints: ConstraintSet::any(),
      conflict_reporting: ConflictReporting::default(),
      entry_point_precedence: EntryPointPrecedence::default(),
      interpreter: DEFAULT_INTERPRETER.to_string(),
    }
  }
}

impl PackageConfig {
  /// Defaults plus overrides from the environment.
  ///
  /// An unparseable `PAKT_HOST_PLATFORM` is ignored with a warning.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Ok(raw) = std::env::var(HOST_PLATFORM_ENV) {
      match raw.parse() {
        Ok(tag) => config.host_platform = Some(tag),
        Err(e) => warn!(value = %raw, error = %e, "ignoring {HOST_PLATFORM_ENV}"),
      }
    }
    config
  }

  /// The configured host platform, or the detected one.
  pub fn host_platform(&self) -> Result<PlatformTag, PlatformError> {
    match &self.host_platform {
      Some(tag) => Ok(tag.clone()),
      None => PlatformTag::host().ok_or(PlatformError::UnknownHost),
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
