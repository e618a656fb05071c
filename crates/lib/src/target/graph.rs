use std::collections::{BTreeMap, BTreeSet};
use std::io;

use super::{Address, Target};
use crate::consts::SOURCE_FILE_EXTENSIONS;
use crate::entry_point::ModulePath;

/// Read-only view of the target graph.
pub trait DependencyGraphView {
  fn target(&self, address: &Address) -> Option<&Target>;

  /// Outgoing edges of `target`, in declaration order.
  fn neighbors(&self, target: &Target) -> Vec<Address>;
}

/// Maps project-relative file paths onto the import namespace and onto the
/// targets that own them.
pub trait SourceLayout {
  /// The path relative to the innermost source root containing it.
  fn relative_to_source_root(&self, path: &str) -> Option<String>;

  /// The target whose sources include `path`.
  fn owning_target(&self, path: &str) -> Option<Address>;

  /// Importable module for a source file: `src/app/main.py` under root `src`
  /// is `app.main`, and a package's `__init__.py` names the package itself.
  fn file_to_module(&self, path: &str) -> Option<ModulePath> {
    let relative = self.relative_to_source_root(path)?;
    let stem = SOURCE_FILE_EXTENSIONS
      .iter()
      .find_map(|ext| relative.strip_suffix(ext))?;

    let mut parts: Vec<&str> = stem.split('/').collect();
    if parts.last() == Some(&"__init__") {
      parts.pop();
    }
    if parts.is_empty() || parts.iter().any(|part| part.is_empty() || part.contains('.')) {
      return None;
    }
    ModulePath::new(parts.join(".")).ok()
  }
}

/// Source file access.
pub trait SourceReader {
  /// Expand a declared source into concrete file paths, sorted.
  fn expand(&self, path: &str) -> io::Result<Vec<String>> {
    Ok(vec![path.to_string()])
  }

  fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Extra edges added on top of a base graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectedEdges(BTreeMap<Address, BTreeSet<Address>>);

impl InjectedEdges {
  /// Add `from -> to`. Returns `false` when the edge was already present.
  pub fn insert(&mut self, from: Address, to: Address) -> bool {
    self.0.entry(from).or_default().insert(to)
  }

  pub fn contains(&self, from: &Address, to: &Address) -> bool {
    self.0.get(from).is_some_and(|targets| targets.contains(to))
  }

  pub fn len(&self) -> usize {
    self.0.values().map(BTreeSet::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  fn edges_from(&self, from: &Address) -> impl Iterator<Item = &Address> {
    self.0.get(from).into_iter().flatten()
  }
}

/// A graph view with injected edges layered over a base view.
pub struct LayeredGraph<'a, G: ?Sized> {
  base: &'a G,
  injected: &'a InjectedEdges,
}

impl<'a, G: DependencyGraphView + ?Sized> LayeredGraph<'a, G> {
  pub fn new(base: &'a G, injected: &'a InjectedEdges) -> Self {
    Self { base, injected }
  }
}

impl<G: DependencyGraphView + ?Sized> DependencyGraphView for LayeredGraph<'_, G> {
  fn target(&self, address: &Address) -> Option<&Target> {
    self.base.target(address)
  }

  fn neighbors(&self, target: &Target) -> Vec<Address> {
    let mut neighbors = self.base.neighbors(target);
    for extra in self.injected.edges_from(&target.address) {
      if !neighbors.contains(extra) {
        neighbors.push(extra.clone());
      }
    }
    neighbors
  }
}

/// Sources held in memory, keyed by project-relative path.
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
  files: BTreeMap<String, Vec<u8>>,
}

impl MemorySources {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> &mut Self {
    self.files.insert(path.into(), content.into());
    self
  }

  pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    self.insert(path, content);
    self
  }
}

impl SourceReader for MemorySources {
  fn expand(&self, path: &str) -> io::Result<Vec<String>> {
    if self.files.contains_key(path) {
      return Ok(vec![path.to_string()]);
    }
    let prefix = format!("{}/", path.trim_end_matches('/'));
    let nested: Vec<String> = self
      .files
      .range(prefix.clone()..)
      .take_while(|(key, _)| key.starts_with(&prefix))
      .map(|(key, _)| key.clone())
      .collect();
    if nested.is_empty() {
      // Unknown paths are reported by `read`.
      Ok(vec![path.to_string()])
    } else {
      Ok(nested)
    }
  }

  fn read(&self, path: &str) -> io::Result<Vec<u8>> {
    self
      .files
      .get(path)
      .cloned()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such source: {path}")))
  }
}
