//! Dependency closure resolution.
//!
//! Walks a [`DependencyGraphView`] breadth-first from a root target and
//! collects the reachable targets, their source files and their third-party
//! requirements. Requirement specifiers with the same canonical name are
//! merged by intersection and then pinned through a [`RequirementResolver`].

mod dag;
mod types;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::constraint::{ConflictReporting, Reconciler};
use crate::requirement::RequirementResolver;
use crate::target::{Address, DependencyGraphView, SourceLayout, SourceReader};
use crate::util::hash::hash_bytes;

use dag::TargetDag;
pub use types::{ClosureError, ClosureFile, ClosureRequirement, DependencyClosure};

/// A requirement name being merged across the closure.
struct PendingRequirement {
  name: String,
  reconciler: Reconciler,
  required_by: Vec<Address>,
}

/// Computes the [`DependencyClosure`] of a target.
pub struct ClosureResolver<'a> {
  graph: &'a dyn DependencyGraphView,
  layout: &'a dyn SourceLayout,
  sources: &'a dyn SourceReader,
  requirements: &'a dyn RequirementResolver,
  reporting: ConflictReporting,
}

impl<'a> ClosureResolver<'a> {
  pub fn new(
    graph: &'a dyn DependencyGraphView,
    layout: &'a dyn SourceLayout,
    sources: &'a dyn SourceReader,
    requirements: &'a dyn RequirementResolver,
  ) -> Self {
    Self {
      graph,
      layout,
      sources,
      requirements,
      reporting: ConflictReporting::default(),
    }
  }

  pub fn with_reporting(mut self, reporting: ConflictReporting) -> Self {
    self.reporting = reporting;
    self
  }

  /// Resolve the closure of `root`.
  ///
  /// # Errors
  ///
  /// - `UnknownTarget` if any reachable address has no target
  /// - `Cycle` if the reachable subgraph has a cycle
  /// - `SourceUnavailable` / `ArchivePathCollision` for unusable sources
  /// - `UnsatisfiableRequirement`, `UnlockedRequirement` or
  ///   `LockedVersionRejected` for third-party requirements
  pub fn resolve(&self, root: &Address) -> Result<DependencyClosure, ClosureError> {
    let (targets, edges) = self.traverse(root)?;
    TargetDag::new(&targets, &edges)
      .verify_acyclic()
      .map_err(|cycle| ClosureError::Cycle { cycle })?;

    let files = self.collect_files(&targets)?;
    let requirements = self.collect_requirements(&targets)?;

    debug!(
      root = %root,
      targets = targets.len(),
      files = files.len(),
      requirements = requirements.len(),
      "resolved dependency closure"
    );

    Ok(DependencyClosure {
      root: root.clone(),
      targets,
      files,
      requirements,
    })
  }

  /// Breadth-first walk. Returns targets in discovery order and every edge seen.
  fn traverse(&self, root: &Address) -> Result<(Vec<Address>, Vec<(Address, Address)>), ClosureError> {
    let mut order = Vec::new();
    let mut edges = Vec::new();
    let mut seen = HashSet::from([root.clone()]);
    let mut queue = VecDeque::from([(root.clone(), None::<Address>)]);

    while let Some((address, referrer)) = queue.pop_front() {
      let target = self
        .graph
        .target(&address)
        .ok_or_else(|| ClosureError::UnknownTarget {
          address: address.clone(),
          referenced_from: referrer,
        })?;

      for neighbor in self.graph.neighbors(target) {
        edges.push((address.clone(), neighbor.clone()));
        if seen.insert(neighbor.clone()) {
          queue.push_back((neighbor, Some(address.clone())));
        }
      }
      order.push(address);
    }

    Ok((order, edges))
  }

  fn collect_files(&self, targets: &[Address]) -> Result<Vec<ClosureFile>, ClosureError> {
    let mut files = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut archive_paths: HashMap<String, String> = HashMap::new();

    for address in targets {
      let Some(target) = self.graph.target(address) else {
        continue;
      };

      for declared in target.source_paths() {
        let unavailable = |path: &str, err: std::io::Error| ClosureError::SourceUnavailable {
          path: path.to_string(),
          owner: address.clone(),
          message: err.to_string(),
        };

        let expanded = self.sources.expand(&declared).map_err(|e| unavailable(&declared, e))?;
        for path in expanded {
          if !seen.insert(path.clone()) {
            continue;
          }

          let content = self.sources.read(&path).map_err(|e| unavailable(&path, e))?;
          let archive_path = self
            .layout
            .relative_to_source_root(&path)
            .unwrap_or_else(|| path.clone());
          if let Some(first) = archive_paths.insert(archive_path.clone(), path.clone()) {
            return Err(ClosureError::ArchivePathCollision {
              archive_path,
              first,
              second: path,
            });
          }

          files.push(ClosureFile {
            digest: hash_bytes(&content),
            content: Arc::from(content),
            path,
            archive_path,
            owner: address.clone(),
          });
        }
      }
    }

    Ok(files)
  }

  fn collect_requirements(&self, targets: &[Address]) -> Result<Vec<ClosureRequirement>, ClosureError> {
    let mut pending: Vec<PendingRequirement> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for address in targets {
      let Some(target) = self.graph.target(address) else {
        continue;
      };

      for spec in &target.requirements {
        let name = spec.canonical_name();
        let slot = *index.entry(name.clone()).or_insert_with(|| {
          pending.push(PendingRequirement {
            name: name.clone(),
            reconciler: Reconciler::new(self.reporting),
            required_by: Vec::new(),
          });
          pending.len() - 1
        });

        let entry = &mut pending[slot];
        entry
          .reconciler
          .add(address, &spec.constraint)
          .map_err(|conflict| ClosureError::UnsatisfiableRequirement {
            name: name.clone(),
            conflict,
          })?;
        if !entry.required_by.contains(address) {
          entry.required_by.push(address.clone());
        }
      }
    }

    pending
      .into_iter()
      .map(|entry| {
        let PendingRequirement {
          name,
          reconciler,
          required_by,
        } = entry;
        let (constraint, contributions) = reconciler.into_parts();

        let resolved = self
          .requirements
          .resolve(&name)
          .ok_or_else(|| ClosureError::UnlockedRequirement {
            name: name.clone(),
            required_by,
          })?;
        if !constraint.admits(&resolved.version) {
          return Err(ClosureError::LockedVersionRejected {
            name,
            version: resolved.version,
            constraint,
          });
        }

        Ok(ClosureRequirement {
          name,
          constraint,
          contributions,
          resolved,
        })
      })
      .collect()
  }
}
