//! Launcher record and stub content embedded in artifacts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::consts::LAUNCHER_FORMAT;
use crate::constraint::ConstraintSet;
use crate::entry_point::ResolvedEntryPoint;
use crate::fingerprint::Fingerprint;
use crate::package::PackagePlan;
use crate::platform::PlatformTag;
use crate::target::{EnvVar, ExecutionMode};

/// `__main__.py` for zipapp artifacts
pub const ZIPAPP_MAIN: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/stubs/zipapp_main.py"));

/// `__main__.py` for zipapp artifacts without an entry point
pub const INTERACTIVE_MAIN: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/stubs/interactive_main.py"));

/// `__main__.py` for venv artifacts
pub const VENV_MAIN: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/stubs/venv_main.py"));

/// Everything the stub needs at run time, stored as `__pakt__/launcher.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherRecord {
  pub format: u32,
  pub fingerprint: Fingerprint,
  pub output_path: String,
  pub entry_point: ResolvedEntryPoint,
  pub args: Vec<String>,
  pub env: Vec<EnvVar>,
  pub platforms: BTreeSet<PlatformTag>,
  pub constraints: ConstraintSet,
  pub execution_mode: ExecutionMode,
  pub interpreter: String,
  /// `name==version` pins sorted by name.
  pub requirements: Vec<String>,
}

impl LauncherRecord {
  pub fn from_plan(plan: &PackagePlan) -> Self {
    Self {
      format: LAUNCHER_FORMAT,
      fingerprint: plan.fingerprint.clone(),
      output_path: plan.output_path.clone(),
      entry_point: plan.entry_point.clone(),
      args: plan.args.clone(),
      env: plan.env.clone(),
      platforms: plan.platforms.tags.clone(),
      constraints: plan.constraints.clone(),
      execution_mode: plan.execution_mode,
      interpreter: plan.interpreter.clone(),
      requirements: plan.closure.pins(),
    }
  }

  /// Requirements file content: one pin per line.
  pub fn requirements_txt(&self) -> String {
    self.requirements.iter().map(|pin| format!("{pin}\n")).collect()
  }
}
