//! Entry point resolution.
//!
//! Decides how a packaged artifact is invoked. A source-file entry point is
//! translated to the module it defines, and the target owning that file is
//! reported as an extra dependency edge so the caller can pull it into the
//! closure.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::closure::DependencyClosure;
use crate::consts::SOURCE_FILE_EXTENSIONS;
use crate::target::{Address, SourceLayout, Target};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryPointError {
  #[error("invalid entry point '{spec}': {reason}")]
  InvalidSpec { spec: String, reason: String },

  #[error("{target} sets both entry_point '{entry_point}' and script '{script}'")]
  AmbiguousEntryPoint {
    target: Address,
    entry_point: String,
    script: String,
  },

  #[error("entry point file {path} is not under any source root")]
  NotUnderSourceRoot { path: String },

  #[error("entry point file {path} is not owned by any target")]
  UnownedSourceFile { path: String },

  #[error("no requirement in the closure of {root} provides script '{name}'")]
  UnresolvedScript { name: String, root: Address },
}

/// Dotted import path such as `app.main`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(String);

impl ModulePath {
  pub fn new(path: impl Into<String>) -> Result<Self, EntryPointError> {
    let path = path.into();
    if path.split('.').all(is_identifier) {
      Ok(Self(path))
    } else {
      Err(EntryPointError::InvalidSpec {
        reason: "not a dotted module path".to_string(),
        spec: path,
      })
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ModulePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

fn is_identifier(part: &str) -> bool {
  !part.is_empty()
    && !part.starts_with(|c: char| c.is_ascii_digit())
    && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Which declaration wins when a target sets both `entry_point` and `script`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryPointPrecedence {
  #[default]
  Reject,
  PreferScript,
  PreferEntryPoint,
}

/// An entry point as declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPointSpec {
  Module {
    module: ModulePath,
    function: Option<String>,
  },
  /// Path relative to the root target's directory.
  SourceFile {
    path: String,
    function: Option<String>,
  },
  Script {
    name: String,
  },
  None,
}

impl EntryPointSpec {
  /// Parse an `entry_point` string: `pkg.mod`, `pkg.mod:fn`, `main.py` or
  /// `main.py:fn`.
  pub fn parse(raw: &str) -> Result<Self, EntryPointError> {
    let spec = raw.trim();
    let invalid = |reason: &str| EntryPointError::InvalidSpec {
      spec: spec.to_string(),
      reason: reason.to_string(),
    };
    if spec.is_empty() {
      return Err(invalid("empty"));
    }

    let (target, function) = match spec.rsplit_once(':') {
      Some((target, function)) => {
        if !function.split('.').all(is_identifier) {
          return Err(invalid("function must be a dotted identifier"));
        }
        (target, Some(function.to_string()))
      }
      None => (spec, None),
    };

    if SOURCE_FILE_EXTENSIONS.iter().any(|ext| target.ends_with(ext)) {
      return Ok(Self::SourceFile {
        path: target.trim_start_matches("./").to_string(),
        function,
      });
    }
    if target.contains('/') {
      return Err(invalid("file entry points must name a .py file"));
    }

    let module = ModulePath::new(target).map_err(|_| invalid("not a dotted module path"))?;
    Ok(Self::Module { module, function })
  }

  /// The entry point a target declares, applying `precedence` when it sets both
  /// `entry_point` and `script`.
  pub fn for_target(target: &Target, precedence: EntryPointPrecedence) -> Result<Self, EntryPointError> {
    match (&target.entry_point, &target.script) {
      (None, None) => Ok(Self::None),
      (Some(entry_point), None) => Self::parse(entry_point),
      (None, Some(script)) => Ok(Self::Script { name: script.clone() }),
      (Some(entry_point), Some(script)) => match precedence {
        EntryPointPrecedence::Reject => Err(EntryPointError::AmbiguousEntryPoint {
          target: target.address.clone(),
          entry_point: entry_point.clone(),
          script: script.clone(),
        }),
        EntryPointPrecedence::PreferScript => Ok(Self::Script { name: script.clone() }),
        EntryPointPrecedence::PreferEntryPoint => Self::parse(entry_point),
      },
    }
  }
}

/// How the artifact is invoked once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedEntryPoint {
  Module {
    module: ModulePath,
    function: Option<String>,
  },
  /// Console script `name` installed by the pinned `requirement`.
  Script { name: String, requirement: String },
  Interactive,
}

impl fmt::Display for ResolvedEntryPoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Module {
        module,
        function: Some(function),
      } => write!(f, "{module}:{function}"),
      Self::Module { module, function: None } => write!(f, "{module}"),
      Self::Script { name, requirement } => write!(f, "script {name} ({requirement})"),
      Self::Interactive => f.write_str("<interactive>"),
    }
  }
}

/// A dependency edge the closure must gain for the entry point to work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraEdge {
  pub from: Address,
  pub to: Address,
}

/// Resolves [`EntryPointSpec`]s against a closure.
pub struct EntryPointResolver<'a> {
  layout: &'a dyn SourceLayout,
}

impl<'a> EntryPointResolver<'a> {
  pub fn new(layout: &'a dyn SourceLayout) -> Self {
    Self { layout }
  }

  pub fn resolve(
    &self,
    spec: &EntryPointSpec,
    root: &Address,
    closure: &DependencyClosure,
  ) -> Result<(ResolvedEntryPoint, Vec<ExtraEdge>), EntryPointError> {
    match spec {
      EntryPointSpec::Module { module, function } => Ok((
        ResolvedEntryPoint::Module {
          module: module.clone(),
          function: function.clone(),
        },
        Vec::new(),
      )),

      EntryPointSpec::SourceFile { path, function } => {
        let path = root.join(path);
        let module = self
          .layout
          .file_to_module(&path)
          .ok_or_else(|| EntryPointError::NotUnderSourceRoot { path: path.clone() })?;
        let owner = self
          .layout
          .owning_target(&path)
          .ok_or_else(|| EntryPointError::UnownedSourceFile { path: path.clone() })?;

        debug!(path = %path, module = %module, owner = %owner, "translated file entry point");
        let edges = if &owner == root {
          Vec::new()
        } else {
          vec![ExtraEdge {
            from: root.clone(),
            to: owner,
          }]
        };
        Ok((
          ResolvedEntryPoint::Module {
            module,
            function: function.clone(),
          },
          edges,
        ))
      }

      EntryPointSpec::Script { name } => closure
        .requirements
        .iter()
        .find(|requirement| requirement.resolved.provides_script(name))
        .map(|requirement| {
          (
            ResolvedEntryPoint::Script {
              name: name.clone(),
              requirement: requirement.resolved.pin(),
            },
            Vec::new(),
          )
        })
        .ok_or_else(|| EntryPointError::UnresolvedScript {
          name: name.clone(),
          root: root.clone(),
        }),

      EntryPointSpec::None => Ok((ResolvedEntryPoint::Interactive, Vec::new())),
    }
  }
}
