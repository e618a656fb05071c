//! Packaging: from a target address to a cached artifact.
//!
//! [`Packager::plan`] resolves the closure, entry point, runtime constraints
//! and platforms of a target and fingerprints the result. Building a plan
//! goes through the [`BuildCache`], which assembles each fingerprint at most
//! once.

mod plan;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::artifact::Artifact;
use crate::assemble::{ArtifactAssembler, AssemblyError};
use crate::cache::{BuildCache, CacheError};
use crate::closure::ClosureError;
use crate::constraint::ReconcileError;
use crate::entry_point::EntryPointError;
use crate::platform::PlatformError;
use crate::target::Address;
use crate::util::hash::HashError;

pub use crate::config::PackageConfig;
pub use plan::{PackageOverrides, PackagePlan, ProjectModel};

#[derive(Debug, Error)]
pub enum PackageError {
  #[error(transparent)]
  Closure(#[from] ClosureError),

  #[error(transparent)]
  EntryPoint(#[from] EntryPointError),

  #[error(transparent)]
  Platform(#[from] PlatformError),

  #[error(transparent)]
  Reconcile(#[from] ReconcileError),

  #[error("failed to fingerprint package plan: {0}")]
  Fingerprint(#[from] HashError),

  #[error(transparent)]
  Cache(#[from] CacheError),
}

impl PackageError {
  /// Only transient assembly or store failures are worth retrying.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Cache(e) if e.is_retryable())
  }
}

/// Outcome of packaging one target.
pub type PackageResult = Result<Arc<Artifact>, PackageError>;

/// Packages targets into artifacts.
#[derive(Clone)]
pub struct Packager {
  config: PackageConfig,
  cache: BuildCache,
  assembler: ArtifactAssembler,
}

impl Packager {
  pub fn new(config: PackageConfig, cache: BuildCache) -> Self {
    Self {
      config,
      cache,
      assembler: ArtifactAssembler::new(),
    }
  }

  pub fn config(&self) -> &PackageConfig {
    &self.config
  }

  pub fn cache(&self) -> &BuildCache {
    &self.cache
  }

  /// Resolve everything about `address` without building.
  pub fn plan(
    &self,
    model: &ProjectModel<'_>,
    address: &Address,
    overrides: &PackageOverrides,
  ) -> Result<PackagePlan, PackageError> {
    Self::plan_with(&self.config, model, address, overrides)
  }

  /// [`Packager::plan`] with an explicit configuration.
  pub fn plan_with(
    config: &PackageConfig,
    model: &ProjectModel<'_>,
    address: &Address,
    overrides: &PackageOverrides,
  ) -> Result<PackagePlan, PackageError> {
    plan::plan(config, model, address, overrides)
  }

  /// Build a plan through the cache.
  ///
  /// The returned future owns everything it needs, so it can be spawned.
  pub fn build(&self, plan: PackagePlan) -> impl Future<Output = PackageResult> + Send + 'static {
    build_plan(self.cache.clone(), self.assembler, plan)
  }

  /// Plan and build a single target.
  pub async fn package(
    &self,
    model: &ProjectModel<'_>,
    address: &Address,
    overrides: &PackageOverrides,
  ) -> PackageResult {
    let plan = self.plan(model, address, overrides)?;
    self.build(plan).await
  }

  /// Package several targets concurrently.
  ///
  /// Plans are resolved first; builds then run as separate tasks, at most
  /// `parallelism` at a time. Every address gets its own result, in request
  /// order, and one failure does not stop the others.
  pub async fn package_all(
    &self,
    model: &ProjectModel<'_>,
    addresses: &[Address],
    overrides: &PackageOverrides,
  ) -> Vec<(Address, PackageResult)> {
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut results: Vec<Option<PackageResult>> = Vec::with_capacity(addresses.len());
    let mut join_set = JoinSet::new();

    for (index, address) in addresses.iter().enumerate() {
      match self.plan(model, address, overrides) {
        Ok(plan) => {
          results.push(None);
          let build = self.build(plan);
          let semaphore = semaphore.clone();
          join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            (index, build.await)
          });
        }
        Err(e) => {
          error!(address = %address, error = %e, "planning failed");
          results.push(Some(Err(e)));
        }
      }
    }

    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((index, result)) => results[index] = Some(result),
        Err(e) => error!(error = %e, "package task failed"),
      }
    }

    addresses
      .iter()
      .cloned()
      .zip(results)
      .map(|(address, result)| {
        let result = result.unwrap_or_else(|| {
          Err(PackageError::Cache(CacheError::Build(Arc::new(AssemblyError::Task(format!(
            "packaging {address} did not complete"
          ))))))
        });
        (address, result)
      })
      .collect()
  }
}

async fn build_plan(
  cache: BuildCache,
  assembler: ArtifactAssembler,
  plan: PackagePlan,
) -> PackageResult {
  let fingerprint = plan.fingerprint.clone();
  let address = plan.root.clone();
  info!(address = %address, fingerprint = %fingerprint.short(), "packaging");

  let artifact = cache
    .get_or_build(&fingerprint, move || async move {
      tokio::task::spawn_blocking(move || assembler.assemble(&plan))
        .await
        .unwrap_or_else(|e| Err(AssemblyError::Task(e.to_string())))
    })
    .await?;

  info!(
    address = %address,
    fingerprint = %fingerprint.short(),
    bytes = artifact.bytes().len(),
    "packaged"
  );
  Ok(artifact)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constraint::ConflictReporting;
  use crate::entry_point::{EntryPointPrecedence, ResolvedEntryPoint};
  use crate::platform::PlatformTag;
  use crate::requirement::ResolvedRequirement;
  use crate::target::{ExecutionMode, Target};
  use crate::util::testutil::{Fixture, addr, req, ver};

  fn config() -> PackageConfig {
    PackageConfig {
      host_platform: Some(PlatformTag::new("linux-x86_64")),
      ..PackageConfig::default()
    }
  }

  fn plan(fixture: Fixture, address: &str) -> Result<PackagePlan, PackageError> {
    let (project, sources) = fixture.build();
    Packager::plan_with(&config(), &project.model(&sources), &addr(address), &PackageOverrides::default())
  }

  #[test]
  fn file_entry_point_pulls_in_its_owner() {
    let fixture = Fixture::new()
      .source_root("src")
      .target(Target::new(addr("src/app:app")).with_entry_point("cli.py:main"))
      .target(
        Target::new(addr("src/app:cli"))
          .with_sources(["cli.py"])
          .with_dependencies([addr("src/shared")]),
      )
      .target(Target::new(addr("src/shared")).with_sources(["util.py"]))
      .file("src/app/cli.py", "")
      .file("src/shared/util.py", "");

    let plan = plan(fixture, "src/app:app").unwrap();
    assert_eq!(
      plan.closure.targets,
      vec![addr("src/app:app"), addr("src/app:cli"), addr("src/shared")]
    );
    assert!(plan.closure.contains_file("src/shared/util.py"));
    assert_eq!(plan.entry_point.to_string(), "app.cli:main");
  }

  #[test]
  fn file_entry_point_already_in_closure_adds_nothing() {
    let fixture = Fixture::new()
      .target(
        Target::new(addr("app"))
          .with_sources(["main.py"])
          .with_entry_point("main.py"),
      )
      .file("app/main.py", "");

    let plan = plan(fixture, "app").unwrap();
    assert_eq!(plan.closure.targets, vec![addr("app")]);
    assert_eq!(plan.entry_point.to_string(), "app.main");
  }

  #[test]
  fn interpreter_constraints_are_reconciled_across_the_closure() {
    let fixture = Fixture::new()
      .target(
        Target::new(addr("app"))
          .with_dependencies([addr("lib")])
          .with_interpreter_constraints(">=3.8".parse().unwrap()),
      )
      .target(Target::new(addr("lib")).with_interpreter_constraints("<3.12".parse().unwrap()));

    let plan = plan(fixture, "app").unwrap();
    assert_eq!(plan.constraints.to_string(), ">=3.8,<3.12");
  }

  #[test]
  fn conflicting_interpreter_constraints_fail() {
    let fixture = Fixture::new()
      .target(
        Target::new(addr("app"))
          .with_dependencies([addr("lib")])
          .with_interpreter_constraints(">=3.12".parse().unwrap()),
      )
      .target(Target::new(addr("lib")).with_interpreter_constraints("<3.10".parse().unwrap()));

    let err = plan(fixture, "app").unwrap_err();
    assert!(matches!(err, PackageError::Reconcile(ReconcileError::UnsatisfiableConstraint(_))));
    assert!(!err.is_retryable());
  }

  #[test]
  fn default_constraints_apply_to_silent_targets() {
    let (project, sources) = Fixture::new().target(Target::new(addr("app"))).build();
    let config = PackageConfig {
      default_constraints: "CPython>=3.9".parse().unwrap(),
      ..config()
    };
    let plan =
      Packager::plan_with(&config, &project.model(&sources), &addr("app"), &PackageOverrides::default()).unwrap();
    assert_eq!(plan.constraints.to_string(), "cpython>=3.9");
  }

  #[test]
  fn overrides_replace_declared_mode_and_platforms() {
    let (project, sources) = Fixture::new()
      .target(
        Target::new(addr("app"))
          .with_requirements([req("numpy")])
          .with_platforms([PlatformTag::new("linux-x86_64")]),
      )
      .lock(ResolvedRequirement::native(
        "numpy",
        ver("1.26"),
        [PlatformTag::new("linux-x86_64"), PlatformTag::new("macosx-arm64")],
      ))
      .build();
    let overrides = PackageOverrides {
      platforms: Some(vec![PlatformTag::new("macosx-arm64")]),
      execution_mode: Some(ExecutionMode::Venv),
    };

    let plan = Packager::plan_with(&config(), &project.model(&sources), &addr("app"), &overrides).unwrap();
    assert_eq!(plan.execution_mode, ExecutionMode::Venv);
    assert_eq!(plan.output_path, "app/app.venv.pex");
    assert!(plan.platforms.is_cross_build());
    assert_eq!(
      plan.platforms.tags.iter().map(PlatformTag::as_str).collect::<Vec<_>>(),
      vec!["macosx-arm64"]
    );
  }

  #[test]
  fn explicit_output_path_is_kept() {
    let fixture = Fixture::new().target(Target::new(addr("app")).with_output_path("bin/tool.pex"));
    assert_eq!(plan(fixture, "app").unwrap().output_path, "bin/tool.pex");
  }

  #[test]
  fn unknown_root_is_reported() {
    let err = plan(Fixture::new(), "missing").unwrap_err();
    assert!(matches!(
      err,
      PackageError::Closure(ClosureError::UnknownTarget { referenced_from: None, .. })
    ));
  }

  #[test]
  fn ambiguous_entry_point_respects_precedence() {
    let (project, sources) = Fixture::new()
      .target(
        Target::new(addr("app"))
          .with_requirements([req("black")])
          .with_entry_point("app.main")
          .with_script("black"),
      )
      .lock(ResolvedRequirement::pure("black", ver("24.1")).with_scripts(["black"]))
      .build();
    let model = project.model(&sources);
    let overrides = PackageOverrides::default();

    let err = Packager::plan_with(&config(), &model, &addr("app"), &overrides).unwrap_err();
    assert!(matches!(err, PackageError::EntryPoint(EntryPointError::AmbiguousEntryPoint { .. })));

    let prefer_script = PackageConfig {
      entry_point_precedence: EntryPointPrecedence::PreferScript,
      ..config()
    };
    let plan = Packager::plan_with(&prefer_script, &model, &addr("app"), &overrides).unwrap();
    assert_eq!(
      plan.entry_point,
      ResolvedEntryPoint::Script {
        name: "black".to_string(),
        requirement: "black==24.1".to_string(),
      }
    );
  }

  #[test]
  fn first_incompatible_reporting_is_forwarded() {
    let (project, sources) = Fixture::new()
      .target(
        Target::new(addr("a"))
          .with_requirements([req("r>=1.0")])
          .with_dependencies([addr("b"), addr("c")]),
      )
      .target(Target::new(addr("b")).with_requirements([req("r<3.0")]))
      .target(Target::new(addr("c")).with_requirements([req("r>=4.0")]))
      .lock(ResolvedRequirement::pure("r", ver("1.0")))
      .build();
    let config = PackageConfig {
      conflict_reporting: ConflictReporting::FirstIncompatible,
      ..config()
    };

    let err =
      Packager::plan_with(&config, &project.model(&sources), &addr("a"), &PackageOverrides::default()).unwrap_err();
    let PackageError::Closure(ClosureError::UnsatisfiableRequirement { conflict, .. }) = err else {
      panic!("expected unsatisfiable requirement, got {err:?}");
    };
    assert_eq!(conflict.accumulated.len(), 1);
    assert_eq!(conflict.accumulated[0].origin, addr("b"));
  }

  #[tokio::test]
  async fn package_all_keeps_request_order_and_isolates_failures() {
    let (project, sources) = Fixture::new()
      .target(Target::new(addr("one")).with_sources(["a.py"]))
      .target(Target::new(addr("two")).with_sources(["b.py"]))
      .target(Target::new(addr("broken")).with_dependencies([addr("nowhere")]))
      .file("one/a.py", "a = 1\n")
      .file("two/b.py", "b = 2\n")
      .build();
    let packager = Packager::new(config(), BuildCache::in_memory());

    let results = packager
      .package_all(
        &project.model(&sources),
        &[addr("two"), addr("broken"), addr("one")],
        &PackageOverrides::default(),
      )
      .await;

    let addresses: Vec<_> = results.iter().map(|(address, _)| address.to_string()).collect();
    assert_eq!(addresses, vec!["two:two", "broken:broken", "one:one"]);
    assert_eq!(results[0].1.as_ref().unwrap().relpath, "two/two.pex");
    assert!(matches!(
      results[1].1,
      Err(PackageError::Closure(ClosureError::UnknownTarget { .. }))
    ));
    assert_eq!(results[2].1.as_ref().unwrap().relpath, "one/one.pex");
    assert_eq!(packager.cache().stats().builds, 2);
  }

  #[tokio::test]
  async fn packaging_twice_hits_the_cache() {
    let (project, sources) = Fixture::new()
      .target(Target::new(addr("app")).with_sources(["main.py"]).with_entry_point("main.py"))
      .file("app/main.py", "print('hi')\n")
      .build();
    let packager = Packager::new(config(), BuildCache::in_memory());
    let model = project.model(&sources);
    let overrides = PackageOverrides::default();

    let first = packager.package(&model, &addr("app"), &overrides).await.unwrap();
    let second = packager.package(&model, &addr("app"), &overrides).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(packager.cache().stats().hits, 1);
  }
}
