//! Test fixtures for pakt-lib.
//!
//! [`Fixture`] builds an in-memory [`Project`] plus [`MemorySources`] so tests
//! can drive the resolvers and the packager without touching the filesystem.
//! Integration tests reach it through the `testutil` feature.

use std::path::PathBuf;

use crate::constraint::Version;
use crate::project::Project;
use crate::requirement::{LockedRequirements, RequirementSpec, ResolvedRequirement};
use crate::target::{Address, MemorySources, Target};

pub fn addr(s: &str) -> Address {
  s.parse().unwrap()
}

pub fn req(s: &str) -> RequirementSpec {
  s.parse().unwrap()
}

pub fn ver(s: &str) -> Version {
  s.parse().unwrap()
}

#[derive(Default)]
pub struct Fixture {
  source_roots: Vec<String>,
  targets: Vec<Target>,
  sources: MemorySources,
  lock: LockedRequirements,
}

impl Fixture {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn source_root(mut self, root: &str) -> Self {
    self.source_roots.push(root.to_string());
    self
  }

  pub fn target(mut self, target: Target) -> Self {
    self.targets.push(target);
    self
  }

  pub fn file(mut self, path: &str, content: &str) -> Self {
    self.sources.insert(path, content);
    self
  }

  pub fn lock(mut self, requirement: ResolvedRequirement) -> Self {
    self.lock.insert(requirement);
    self
  }

  pub fn build(self) -> (Project, MemorySources) {
    let project = Project::new(PathBuf::from("."), self.source_roots, self.targets, self.lock)
      .unwrap_or_else(|err| panic!("invalid fixture project: {err}"));
    (project, self.sources)
  }
}
