//! Build targets and the views the engine uses to read them.
//!
//! Targets are immutable value records. The engine never mutates them; the
//! only way dependency edges are added is through a [`LayeredGraph`] overlay.

mod graph;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::ARTIFACT_EXTENSION;
use crate::constraint::ConstraintSet;
use crate::platform::PlatformTag;
use crate::requirement::RequirementSpec;

pub use graph::{DependencyGraphView, InjectedEdges, LayeredGraph, MemorySources, SourceLayout, SourceReader};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
  #[error("invalid address '{0}'")]
  InvalidAddress(String),

  #[error("invalid environment entry '{0}': expected KEY=VALUE")]
  InvalidEnv(String),

  #[error("unknown execution mode '{0}': expected 'zipapp' or 'venv'")]
  InvalidMode(String),
}

/// Target address: `"<dir>:<name>"`.
///
/// `dir` is relative to the project root and may be empty (`:root`). The
/// short form `"<dir>"` names the target whose name is the last component of
/// `dir`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
  dir: String,
  name: String,
}

impl Address {
  pub fn new(dir: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      dir: dir.into().trim_matches('/').to_string(),
      name: name.into(),
    }
  }

  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Join a path relative to this target's directory into a project-relative path.
  pub fn join(&self, relative: &str) -> String {
    let relative = relative.trim_start_matches("./").trim_end_matches('/');
    if self.dir.is_empty() {
      relative.to_string()
    } else if relative.is_empty() {
      self.dir.clone()
    } else {
      format!("{}/{}", self.dir, relative)
    }
  }
}

impl FromStr for Address {
  type Err = TargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let raw = s.trim();
    let trimmed = raw.strip_prefix("//").unwrap_or(raw);
    let invalid = || TargetError::InvalidAddress(raw.to_string());

    let (dir, name) = match trimmed.rsplit_once(':') {
      Some((dir, name)) => (dir.trim_matches('/'), name),
      None => {
        let dir = trimmed.trim_matches('/');
        let name = dir.rsplit('/').next().unwrap_or(dir);
        (dir, name)
      }
    };

    if name.is_empty() || name.contains('/') || dir.split('/').any(|part| part == "..") {
      return Err(invalid());
    }
    Ok(Self::new(dir, name))
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.dir, self.name)
  }
}

impl TryFrom<String> for Address {
  type Error = TargetError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Address> for String {
  fn from(value: Address) -> Self {
    value.to_string()
  }
}

/// How the artifact runs its code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
  /// Sources imported straight out of the archive.
  #[default]
  ZipApp,
  /// Unpacked into a cached virtual environment on first run.
  Venv,
}

impl ExecutionMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::ZipApp => "zipapp",
      Self::Venv => "venv",
    }
  }
}

impl fmt::Display for ExecutionMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for ExecutionMode {
  type Err = TargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "zipapp" => Ok(Self::ZipApp),
      "venv" => Ok(Self::Venv),
      _ => Err(TargetError::InvalidMode(s.to_string())),
    }
  }
}

/// One frozen environment variable, written `KEY=VALUE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvVar {
  pub key: String,
  pub value: String,
}

impl EnvVar {
  pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      value: value.into(),
    }
  }
}

impl FromStr for EnvVar {
  type Err = TargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once('=') {
      Some((key, value)) if !key.is_empty() => Ok(Self::new(key, value)),
      _ => Err(TargetError::InvalidEnv(s.to_string())),
    }
  }
}

impl fmt::Display for EnvVar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={}", self.key, self.value)
  }
}

impl TryFrom<String> for EnvVar {
  type Error = TargetError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<EnvVar> for String {
  fn from(value: EnvVar) -> Self {
    value.to_string()
  }
}

/// A packageable build target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
  pub address: Address,
  #[serde(default)]
  pub dependencies: Vec<Address>,
  /// Paths relative to the target's directory. A directory stands for every
  /// file beneath it.
  #[serde(default)]
  pub sources: Vec<String>,
  #[serde(default)]
  pub requirements: Vec<RequirementSpec>,
  #[serde(default)]
  pub entry_point: Option<String>,
  #[serde(default)]
  pub script: Option<String>,
  #[serde(default)]
  pub platforms: Vec<PlatformTag>,
  #[serde(default)]
  pub args: Vec<String>,
  #[serde(default)]
  pub env: Vec<EnvVar>,
  #[serde(default)]
  pub execution_mode: ExecutionMode,
  #[serde(default)]
  pub interpreter_constraints: Option<ConstraintSet>,
  #[serde(default)]
  pub output_path: Option<String>,
}

impl Target {
  pub fn new(address: Address) -> Self {
    Self {
      address,
      dependencies: Vec::new(),
      sources: Vec::new(),
      requirements: Vec::new(),
      entry_point: None,
      script: None,
      platforms: Vec::new(),
      args: Vec::new(),
      env: Vec::new(),
      execution_mode: ExecutionMode::default(),
      interpreter_constraints: None,
      output_path: None,
    }
  }

  pub fn with_dependencies<I: IntoIterator<Item = Address>>(mut self, dependencies: I) -> Self {
    self.dependencies.extend(dependencies);
    self
  }

  pub fn with_sources<I, S>(mut self, sources: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.sources.extend(sources.into_iter().map(Into::into));
    self
  }

  pub fn with_requirements<I: IntoIterator<Item = RequirementSpec>>(mut self, requirements: I) -> Self {
    self.requirements.extend(requirements);
    self
  }

  pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
    self.entry_point = Some(entry_point.into());
    self
  }

  pub fn with_script(mut self, script: impl Into<String>) -> Self {
    self.script = Some(script.into());
    self
  }

  pub fn with_platforms<I: IntoIterator<Item = PlatformTag>>(mut self, platforms: I) -> Self {
    self.platforms.extend(platforms);
    self
  }

  pub fn with_args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn with_env<I: IntoIterator<Item = EnvVar>>(mut self, env: I) -> Self {
    self.env.extend(env);
    self
  }

  pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
    self.execution_mode = mode;
    self
  }

  pub fn with_interpreter_constraints(mut self, constraints: ConstraintSet) -> Self {
    self.interpreter_constraints = Some(constraints);
    self
  }

  pub fn with_output_path(mut self, output_path: impl Into<String>) -> Self {
    self.output_path = Some(output_path.into());
    self
  }

  /// The first declared path that is absolute or climbs out of the project
  /// with a `..` component: a source, the file entry point or the output path.
  pub fn escaping_path(&self) -> Option<&str> {
    let file_entry = self
      .entry_point
      .as_deref()
      .map(|entry| entry.split_once(':').map_or(entry, |(file, _)| file));
    self
      .sources
      .iter()
      .map(String::as_str)
      .chain(file_entry)
      .chain(self.output_path.as_deref())
      .find(|path| escapes_root(path))
  }

  /// Declared sources as project-relative paths.
  pub fn source_paths(&self) -> impl Iterator<Item = String> + '_ {
    self.sources.iter().map(|source| self.address.join(source))
  }

  /// Where the artifact lands when `output_path` is unset:
  /// `<dir with / replaced by .>/<name>.pex` (`.venv.pex` in venv mode).
  pub fn default_output_path(address: &Address, mode: ExecutionMode) -> String {
    let file = match mode {
      ExecutionMode::ZipApp => format!("{}.{ARTIFACT_EXTENSION}", address.name()),
      ExecutionMode::Venv => format!("{}.venv.{ARTIFACT_EXTENSION}", address.name()),
    };
    if address.dir().is_empty() {
      file
    } else {
      format!("{}/{}", address.dir().replace('/', "."), file)
    }
  }
}

fn escapes_root(path: &str) -> bool {
  path.starts_with('/')
    || path.starts_with('\\')
    || path.as_bytes().get(1) == Some(&b':')
    || path.split(['/', '\\']).any(|part| part == "..")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_full_and_short_addresses() {
    let full: Address = "src/app:app".parse().unwrap();
    assert_eq!(full.dir(), "src/app");
    assert_eq!(full.name(), "app");

    let short: Address = "src/lib".parse().unwrap();
    assert_eq!(short, Address::new("src/lib", "lib"));

    let root: Address = ":root".parse().unwrap();
    assert_eq!(root.dir(), "");
    assert_eq!(root.to_string(), ":root");

    let prefixed: Address = "//src/app:bin".parse().unwrap();
    assert_eq!(prefixed.to_string(), "src/app:bin");
  }

  #[test]
  fn rejects_bad_addresses() {
    assert!("".parse::<Address>().is_err());
    assert!("src/app:".parse::<Address>().is_err());
    assert!("../up:x".parse::<Address>().is_err());
  }

  #[test]
  fn join_resolves_relative_to_target_dir() {
    let address = Address::new("src/app", "app");
    assert_eq!(address.join("main.py"), "src/app/main.py");
    assert_eq!(address.join("./pkg/"), "src/app/pkg");
    assert_eq!(Address::new("", "root").join("main.py"), "main.py");
  }

  #[test]
  fn env_entries_split_on_first_equals() {
    let env: EnvVar = "OPTS=a=b".parse().unwrap();
    assert_eq!(env.key, "OPTS");
    assert_eq!(env.value, "a=b");
    assert_eq!(env.to_string(), "OPTS=a=b");
    assert!("=x".parse::<EnvVar>().is_err());
    assert!("NOVALUE".parse::<EnvVar>().is_err());
  }

  #[test]
  fn default_output_paths() {
    let address = Address::new("src/app", "app");
    assert_eq!(
      Target::default_output_path(&address, ExecutionMode::ZipApp),
      "src.app/app.pex"
    );
    assert_eq!(
      Target::default_output_path(&address, ExecutionMode::Venv),
      "src.app/app.venv.pex"
    );
    assert_eq!(
      Target::default_output_path(&Address::new("", "tool"), ExecutionMode::ZipApp),
      "tool.pex"
    );
  }

  #[test]
  fn target_deserializes_with_defaults() {
    let json = r#"{
      "address": "src/app:app",
      "sources": ["main.py"],
      "dependencies": ["src/lib"],
      "requirements": ["r==1.0"],
      "entry_point": "main.py",
      "env": ["K=V"],
      "execution_mode": "venv"
    }"#;
    let target: Target = serde_json::from_str(json).unwrap();
    assert_eq!(target.dependencies, vec![Address::new("src/lib", "lib")]);
    assert_eq!(target.requirements[0].name, "r");
    assert_eq!(target.env, vec![EnvVar::new("K", "V")]);
    assert_eq!(target.execution_mode, ExecutionMode::Venv);
    assert!(target.platforms.is_empty());
    assert_eq!(target.source_paths().collect::<Vec<_>>(), vec!["src/app/main.py"]);
  }

  #[test]
  fn escaping_paths_are_found() {
    let target = || Target::new(Address::new("src/app", "app"));
    assert_eq!(target().with_sources(["main.py", "pkg/"]).escaping_path(), None);
    assert_eq!(target().with_entry_point("main.py:run").escaping_path(), None);
    assert_eq!(target().with_entry_point("app.main").escaping_path(), None);
    assert_eq!(
      target().with_sources(["main.py", "../../etc/passwd"]).escaping_path(),
      Some("../../etc/passwd")
    );
    assert_eq!(target().with_sources(["/etc/passwd"]).escaping_path(), Some("/etc/passwd"));
    assert_eq!(target().with_sources(["a\\..\\..\\x"]).escaping_path(), Some("a\\..\\..\\x"));
    assert_eq!(target().with_entry_point("../tool.py:main").escaping_path(), Some("../tool.py"));
    assert_eq!(target().with_output_path("../../bin/x.pex").escaping_path(), Some("../../bin/x.pex"));
    assert_eq!(target().with_output_path("C:/bin/x.pex").escaping_path(), Some("C:/bin/x.pex"));
  }

  #[test]
  fn unknown_target_fields_are_rejected() {
    let json = r#"{"address": ":x", "entrypoint": "main.py"}"#;
    assert!(serde_json::from_str::<Target>(json).is_err());
  }
}
