mod info;
mod inspect;
mod package;

use std::path::Path;

use anyhow::{Context, Result};
use pakt_lib::project::Project;

pub use info::cmd_info;
pub use inspect::cmd_inspect;
pub use package::{PackageArgs, cmd_package};

/// Load `pakt.json` from a file or project directory.
fn load_project(path: &Path) -> Result<Project> {
  let path = dunce::canonicalize(path).with_context(|| format!("Project not found: {}", path.display()))?;
  Project::load(&path).with_context(|| format!("Failed to load project {}", path.display()))
}
