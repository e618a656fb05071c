//! End-to-end packaging scenarios through the public API.

use pakt_lib::closure::ClosureError;
use pakt_lib::constraint::ConstraintSet;
use pakt_lib::consts::{INTERACTIVE_MARKER, LAUNCHER_RECORD, MAIN_STUB, REQUIREMENTS_FILE};
use pakt_lib::entry_point::{EntryPointError, ResolvedEntryPoint};
use pakt_lib::package::{PackageError, PackageOverrides, Packager};
use pakt_lib::platform::PlatformError;
use pakt_lib::requirement::ResolvedRequirement;
use pakt_lib::target::{ExecutionMode, Target};

use super::common::{Fixture, HOST, addr, config, packager, req, simple_app, tag, ver};

#[tokio::test]
async fn simple_app_packages_with_module_entry_point() {
  let (project, sources) = simple_app().build();
  let model = project.model(&sources);

  let artifact = packager()
    .package(&model, &addr("src/app"), &PackageOverrides::default())
    .await
    .unwrap();

  assert_eq!(artifact.entry_point().to_string(), "app.main");
  assert_eq!(artifact.record.requirements, vec!["r==1.0"]);
  assert_eq!(
    artifact.platforms().iter().map(|t| t.as_str()).collect::<Vec<_>>(),
    vec![HOST]
  );
  assert_eq!(artifact.execution_mode(), ExecutionMode::ZipApp);
  assert_eq!(artifact.relpath, "src.app/app.pex");

  let members = artifact.member_names().unwrap();
  assert!(members.contains(&"app/main.py".to_string()));
  assert!(members.contains(&LAUNCHER_RECORD.to_string()));
  assert_eq!(artifact.read_member("app/main.py").unwrap(), b"print('hello')\n");
  assert_eq!(artifact.read_member(REQUIREMENTS_FILE).unwrap(), b"r==1.0\n");
}

#[test]
fn simple_app_resolves_on_the_host_without_cross_building() {
  let (project, sources) = simple_app().build();
  let plan = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("src/app"),
    &PackageOverrides::default(),
  )
  .unwrap();

  assert!(!plan.platforms.is_cross_build());
  assert_eq!(plan.closure.pins(), vec!["r==1.0"]);
}

fn merged_requirement_project() -> Fixture {
  Fixture::new()
    .target(
      Target::new(addr("app2"))
        .with_sources(["main.py"])
        .with_dependencies([addr("a"), addr("b")]),
    )
    .target(Target::new(addr("a")).with_requirements([req("r>=1.0,<2.0")]))
    .target(Target::new(addr("b")).with_requirements([req("r>=1.5")]))
    .file("app2/main.py", "")
    .lock(ResolvedRequirement::pure("r", ver("1.7")))
}

#[test]
fn requirement_constraints_from_several_targets_are_intersected() {
  let (project, sources) = merged_requirement_project().build();
  let plan = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("app2"),
    &PackageOverrides::default(),
  )
  .unwrap();

  let r = plan.closure.requirement("r").unwrap();
  assert_eq!(r.constraint, ">=1.5,<2.0".parse::<ConstraintSet>().unwrap());
  assert_eq!(r.constraint.to_string(), ">=1.5,<2");
  assert_eq!(r.resolved.pin(), "r==1.7");
  assert_eq!(
    r.contributions.iter().map(|c| c.origin.clone()).collect::<Vec<_>>(),
    vec![addr("a"), addr("b")]
  );
}

#[test]
fn unsatisfiable_requirement_names_both_sides() {
  let (project, sources) = Fixture::new()
    .target(Target::new(addr("app2")).with_dependencies([addr("a"), addr("b"), addr("c")]))
    .target(Target::new(addr("a")).with_requirements([req("r>=1.0,<2.0")]))
    .target(Target::new(addr("b")).with_requirements([req("r>=1.5")]))
    .target(Target::new(addr("c")).with_requirements([req("r>=2.0")]))
    .lock(ResolvedRequirement::pure("r", ver("1.7")))
    .build();

  let err = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("app2"),
    &PackageOverrides::default(),
  )
  .unwrap_err();

  let PackageError::Closure(ClosureError::UnsatisfiableRequirement { name, conflict }) = &err else {
    panic!("expected unsatisfiable requirement, got {err:?}");
  };
  assert_eq!(name, "r");
  assert_eq!(
    conflict.accumulated.iter().map(|c| c.origin.clone()).collect::<Vec<_>>(),
    vec![addr("a"), addr("b")]
  );
  assert_eq!(conflict.conflicting.origin, addr("c"));

  let message = err.to_string();
  assert!(message.contains("a:a") && message.contains("b:b") && message.contains("c:c"));
}

#[test]
fn script_without_provider_is_unresolved() {
  let (project, sources) = Fixture::new()
    .target(
      Target::new(addr("tool"))
        .with_requirements([req("r==1.0")])
        .with_script("black"),
    )
    .lock(ResolvedRequirement::pure("r", ver("1.0")))
    .build();

  let err = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("tool"),
    &PackageOverrides::default(),
  )
  .unwrap_err();

  assert!(matches!(
    &err,
    PackageError::EntryPoint(EntryPointError::UnresolvedScript { name, .. }) if name == "black"
  ));
}

#[test]
fn script_with_provider_resolves_to_its_pin() {
  let (project, sources) = Fixture::new()
    .target(Target::new(addr("tool")).with_requirements([req("black")]).with_script("black"))
    .lock(ResolvedRequirement::pure("black", ver("24.1")).with_scripts(["black"]))
    .build();

  let plan = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("tool"),
    &PackageOverrides::default(),
  )
  .unwrap();

  assert_eq!(
    plan.entry_point,
    ResolvedEntryPoint::Script {
      name: "black".to_string(),
      requirement: "black==24.1".to_string(),
    }
  );
}

#[test]
fn native_requirement_without_wheel_for_requested_platform_fails() {
  let (project, sources) = Fixture::new()
    .target(
      Target::new(addr("app"))
        .with_requirements([req("numpy")])
        .with_platforms([tag("linux-x86_64")]),
    )
    .lock(ResolvedRequirement::native("numpy", ver("1.26"), [tag("macosx-arm64")]))
    .build();

  let err = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("app"),
    &PackageOverrides::default(),
  )
  .unwrap_err();

  let PackageError::Platform(PlatformError::UnsupportedPlatform {
    requirement, platform, ..
  }) = &err
  else {
    panic!("expected unsupported platform, got {err:?}");
  };
  assert_eq!(requirement, "numpy");
  assert_eq!(platform, &tag("linux-x86_64"));
  assert!(err.to_string().contains("numpy") && err.to_string().contains("linux-x86_64"));
}

#[test]
fn cycles_are_reported_with_their_path() {
  let (project, sources) = Fixture::new()
    .target(Target::new(addr("a")).with_dependencies([addr("b")]))
    .target(Target::new(addr("b")).with_dependencies([addr("a")]))
    .build();

  let err = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("a"),
    &PackageOverrides::default(),
  )
  .unwrap_err();

  let PackageError::Closure(ClosureError::Cycle { cycle }) = &err else {
    panic!("expected a cycle, got {err:?}");
  };
  assert!(cycle.contains(&addr("a")) && cycle.contains(&addr("b")));
}

#[test]
fn missing_dependency_names_its_referrer() {
  let (project, sources) = Fixture::new()
    .target(Target::new(addr("app")).with_dependencies([addr("gone")]))
    .build();

  let err = Packager::plan_with(
    &config(),
    &project.model(&sources),
    &addr("app"),
    &PackageOverrides::default(),
  )
  .unwrap_err();

  assert!(matches!(
    err,
    PackageError::Closure(ClosureError::UnknownTarget { address, referenced_from: Some(from) })
      if address == addr("gone") && from == addr("app")
  ));
}

#[tokio::test]
async fn interactive_target_packages_with_a_console_main() {
  let (project, sources) = Fixture::new()
    .target(Target::new(addr("repl")).with_requirements([req("r==1.0")]))
    .lock(ResolvedRequirement::pure("r", ver("1.0")))
    .build();

  let artifact = packager()
    .package(&project.model(&sources), &addr("repl"), &PackageOverrides::default())
    .await
    .unwrap();
  assert_eq!(artifact.entry_point(), &ResolvedEntryPoint::Interactive);
  assert!(artifact.member_names().unwrap().contains(&INTERACTIVE_MARKER.to_string()));
  let main = String::from_utf8(artifact.read_member(MAIN_STUB).unwrap()).unwrap();
  assert!(main.contains("code.interact()"));
}
