//! Package planning: everything up to the fingerprint.

use tracing::debug;

use super::PackageError;
use crate::closure::{ClosureError, ClosureResolver, DependencyClosure};
use crate::config::PackageConfig;
use crate::constraint::{ConstraintSet, reconcile_constraints};
use crate::entry_point::{EntryPointResolver, EntryPointSpec, ResolvedEntryPoint};
use crate::fingerprint::{Fingerprint, FingerprintInput};
use crate::platform::{PlatformResolver, PlatformTag, ResolvedPlatforms};
use crate::requirement::RequirementResolver;
use crate::target::{
  Address, DependencyGraphView, EnvVar, ExecutionMode, InjectedEdges, LayeredGraph, SourceLayout, SourceReader, Target,
};

/// The collaborators a package operation reads from.
#[derive(Clone, Copy)]
pub struct ProjectModel<'a> {
  pub graph: &'a dyn DependencyGraphView,
  pub layout: &'a dyn SourceLayout,
  pub sources: &'a dyn SourceReader,
  pub requirements: &'a dyn RequirementResolver,
}

/// Per-request overrides of what the target declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageOverrides {
  pub platforms: Option<Vec<PlatformTag>>,
  pub execution_mode: Option<ExecutionMode>,
}

/// A fully resolved package request, ready to assemble.
#[derive(Debug, Clone)]
pub struct PackagePlan {
  pub root: Address,
  pub closure: DependencyClosure,
  pub constraints: ConstraintSet,
  pub entry_point: ResolvedEntryPoint,
  pub platforms: ResolvedPlatforms,
  pub args: Vec<String>,
  pub env: Vec<EnvVar>,
  pub execution_mode: ExecutionMode,
  pub interpreter: String,
  pub output_path: String,
  pub fingerprint: Fingerprint,
}

pub(super) fn plan(
  config: &PackageConfig,
  model: &ProjectModel<'_>,
  address: &Address,
  overrides: &PackageOverrides,
) -> Result<PackagePlan, PackageError> {
  let target = model.graph.target(address).ok_or_else(|| ClosureError::UnknownTarget {
    address: address.clone(),
    referenced_from: None,
  })?;
  let spec = EntryPointSpec::for_target(target, config.entry_point_precedence)?;

  let (closure, entry_point) = resolve_fixed_point(config, model, address, &spec)?;

  let members = closure.targets.iter().map(|member| {
    let declared = model
      .graph
      .target(member)
      .and_then(|t| t.interpreter_constraints.as_ref());
    (member, declared)
  });
  let constraints = reconcile_constraints(members, &config.default_constraints, config.conflict_reporting)?;

  let requested = overrides.platforms.as_deref().unwrap_or(target.platforms.as_slice());
  let platforms = PlatformResolver::new(config.host_platform()?).resolve(requested, &closure)?;

  let execution_mode = overrides.execution_mode.unwrap_or(target.execution_mode);
  let output_path = target
    .output_path
    .clone()
    .unwrap_or_else(|| Target::default_output_path(address, execution_mode));

  let fingerprint = FingerprintInput {
    closure: &closure,
    constraints: &constraints,
    entry_point: &entry_point,
    platforms: &platforms.tags,
    args: &target.args,
    env: &target.env,
    execution_mode,
    interpreter: &config.interpreter,
    output_path: &output_path,
  }
  .compute()?;

  debug!(
    address = %address,
    fingerprint = %fingerprint.short(),
    targets = closure.targets.len(),
    files = closure.files.len(),
    requirements = closure.requirements.len(),
    "planned package"
  );

  Ok(PackagePlan {
    root: address.clone(),
    closure,
    constraints,
    entry_point,
    platforms,
    args: target.args.clone(),
    env: target.env.clone(),
    execution_mode,
    interpreter: config.interpreter.clone(),
    output_path,
    fingerprint,
  })
}

/// Resolve the closure and entry point together.
///
/// A file entry point may live in a target the root does not depend on. Its
/// owner is then injected as an extra edge and the closure resolved again,
/// until no entry point edge leads outside the closure. Injected edges only
/// grow and are drawn from a finite set of targets, so this terminates.
fn resolve_fixed_point(
  config: &PackageConfig,
  model: &ProjectModel<'_>,
  address: &Address,
  spec: &EntryPointSpec,
) -> Result<(DependencyClosure, ResolvedEntryPoint), PackageError> {
  let entry_points = EntryPointResolver::new(model.layout);
  let mut injected = InjectedEdges::default();

  loop {
    let graph = LayeredGraph::new(model.graph, &injected);
    let closure = ClosureResolver::new(&graph, model.layout, model.sources, model.requirements)
      .with_reporting(config.conflict_reporting)
      .resolve(address)?;
    let (entry_point, edges) = entry_points.resolve(spec, address, &closure)?;

    let mut grew = false;
    for edge in edges {
      if !closure.contains_target(&edge.to) && injected.insert(edge.from, edge.to) {
        grew = true;
      }
    }
    if !grew {
      return Ok((closure, entry_point));
    }
    debug!(address = %address, injected = injected.len(), "entry point needs more targets, re-resolving");
  }
}
