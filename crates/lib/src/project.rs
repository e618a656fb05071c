//! JSON project files.
//!
//! A project file lists source roots, targets and the requirement lock. The
//! loaded [`Project`] implements the graph, layout and requirement views the
//! engine reads, and [`FsSources`] reads source files relative to the project
//! root.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::consts::PROJECT_FILE;
use crate::package::ProjectModel;
use crate::requirement::{LockedRequirements, RequirementResolver, ResolvedRequirement};
use crate::target::{Address, DependencyGraphView, SourceLayout, SourceReader, Target};

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("failed to read project file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse project file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("duplicate target {0}")]
  DuplicateTarget(Address),

  #[error("duplicate lock entry for '{0}'")]
  DuplicateLock(String),

  #[error("invalid source root '{0}'")]
  InvalidSourceRoot(String),

  #[error("target {target} declares path '{path}' outside the project")]
  InvalidSource { target: Address, path: String },
}

/// On-disk shape of `pakt.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
  #[serde(default)]
  pub source_roots: Vec<String>,
  #[serde(default)]
  pub targets: Vec<Target>,
  #[serde(default)]
  pub lock: Vec<ResolvedRequirement>,
}

/// A loaded project.
#[derive(Debug, Clone)]
pub struct Project {
  root: PathBuf,
  source_roots: Vec<String>,
  targets: BTreeMap<Address, Target>,
  lock: LockedRequirements,
}

impl Project {
  /// Load a project from a `pakt.json` file, or from a directory containing one.
  pub fn load(path: &Path) -> Result<Self, ProjectError> {
    let file_path = if path.is_dir() {
      path.join(PROJECT_FILE)
    } else {
      path.to_path_buf()
    };

    let content = fs::read_to_string(&file_path).map_err(|source| ProjectError::Read {
      path: file_path.clone(),
      source,
    })?;
    let file: ProjectFile = serde_json::from_str(&content).map_err(|source| ProjectError::Parse {
      path: file_path.clone(),
      source,
    })?;

    let root = file_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    let project = Self::from_file(root, file)?;
    debug!(
      path = %file_path.display(),
      targets = project.targets.len(),
      locked = project.lock.len(),
      "loaded project"
    );
    Ok(project)
  }

  pub fn from_file(root: PathBuf, file: ProjectFile) -> Result<Self, ProjectError> {
    let mut lock = LockedRequirements::new();
    for requirement in file.lock {
      let name = requirement.canonical_name();
      if lock.insert(requirement).is_some() {
        return Err(ProjectError::DuplicateLock(name));
      }
    }
    Self::new(root, file.source_roots, file.targets, lock)
  }

  pub fn new(
    root: PathBuf,
    source_roots: Vec<String>,
    targets: Vec<Target>,
    lock: LockedRequirements,
  ) -> Result<Self, ProjectError> {
    let mut roots = Vec::new();
    for raw in source_roots {
      let normalized = raw.trim_start_matches("./").trim_matches('/').to_string();
      if normalized.split('/').any(|part| part == "..") || Path::new(&raw).is_absolute() {
        return Err(ProjectError::InvalidSourceRoot(raw));
      }
      let normalized = if normalized == "." { String::new() } else { normalized };
      roots.push(normalized);
    }
    if roots.is_empty() {
      roots.push(String::new());
    }

    let mut by_address = BTreeMap::new();
    for target in targets {
      if let Some(path) = target.escaping_path() {
        return Err(ProjectError::InvalidSource {
          target: target.address.clone(),
          path: path.to_string(),
        });
      }
      let address = target.address.clone();
      if by_address.insert(address.clone(), target).is_some() {
        return Err(ProjectError::DuplicateTarget(address));
      }
    }

    Ok(Self {
      root,
      source_roots: roots,
      targets: by_address,
      lock,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn source_roots(&self) -> &[String] {
    &self.source_roots
  }

  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.targets.values()
  }

  pub fn lock(&self) -> &LockedRequirements {
    &self.lock
  }

  /// Reader for this project's sources on disk.
  pub fn sources(&self) -> FsSources {
    FsSources::new(self.root.clone())
  }

  /// The engine's view of this project, reading files through `sources`.
  pub fn model<'a>(&'a self, sources: &'a dyn SourceReader) -> ProjectModel<'a> {
    ProjectModel {
      graph: self,
      layout: self,
      sources,
      requirements: self,
    }
  }
}

impl DependencyGraphView for Project {
  fn target(&self, address: &Address) -> Option<&Target> {
    self.targets.get(address)
  }

  fn neighbors(&self, target: &Target) -> Vec<Address> {
    target.dependencies.clone()
  }
}

impl SourceLayout for Project {
  fn relative_to_source_root(&self, path: &str) -> Option<String> {
    self
      .source_roots
      .iter()
      .filter_map(|root| {
        if root.is_empty() {
          Some((0, path.to_string()))
        } else {
          path
            .strip_prefix(root.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| (root.len(), rest.to_string()))
        }
      })
      .max_by_key(|(len, _)| *len)
      .map(|(_, relative)| relative)
  }

  fn owning_target(&self, path: &str) -> Option<Address> {
    self
      .targets
      .values()
      .find(|target| {
        target
          .source_paths()
          .any(|source| path == source || path.strip_prefix(source.as_str()).is_some_and(|rest| rest.starts_with('/')))
      })
      .map(|target| target.address.clone())
  }
}

impl RequirementResolver for Project {
  fn resolve(&self, canonical_name: &str) -> Option<ResolvedRequirement> {
    self.lock.resolve(canonical_name)
  }
}

/// Reads sources from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsSources {
  root: PathBuf,
}

impl FsSources {
  pub fn new(root: PathBuf) -> Self {
    Self { root }
  }
}

impl SourceReader for FsSources {
  fn expand(&self, path: &str) -> io::Result<Vec<String>> {
    let full = self.root.join(path);
    if !full.is_dir() {
      return Ok(vec![path.to_string()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&full).sort_by_file_name() {
      let entry = entry.map_err(io::Error::other)?;
      if !entry.file_type().is_file() {
        continue;
      }
      let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
      let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
      files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
  }

  fn read(&self, path: &str) -> io::Result<Vec<u8>> {
    fs::read(self.root.join(path))
  }
}
