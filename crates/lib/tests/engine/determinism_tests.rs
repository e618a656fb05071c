//! Fingerprints and artifact bytes depend on the inputs and nothing else.

use pakt_lib::artifact::Artifact;
use pakt_lib::fingerprint::Fingerprint;
use pakt_lib::package::{PackageOverrides, Packager};
use pakt_lib::target::{EnvVar, ExecutionMode, Target};

use super::common::{Fixture, addr, config, packager, req, simple_app, ver};
use pakt_lib::requirement::ResolvedRequirement;

fn fingerprint(project: Fixture, overrides: &PackageOverrides) -> Fingerprint {
  let (project, sources) = project.build();
  Packager::plan_with(&config(), &project.model(&sources), &addr("src/app"), overrides)
    .unwrap()
    .fingerprint
}

fn app_with(target: Target, main: &str) -> Fixture {
  Fixture::new()
    .source_root("src")
    .target(target)
    .file("src/app/main.py", main)
    .lock(ResolvedRequirement::pure("r", ver("1.0")))
    .lock(ResolvedRequirement::pure("r2", ver("2.0")))
}

fn app_target() -> Target {
  Target::new(addr("src/app"))
    .with_sources(["main.py"])
    .with_requirements([req("r==1.0")])
    .with_entry_point("main.py")
}

#[tokio::test]
async fn separate_packagers_produce_identical_bytes() {
  let (project, sources) = simple_app().build();
  let model = project.model(&sources);
  let overrides = PackageOverrides::default();

  let first = packager().package(&model, &addr("src/app"), &overrides).await.unwrap();
  let second = packager().package(&model, &addr("src/app"), &overrides).await.unwrap();

  assert_eq!(first.fingerprint, second.fingerprint);
  assert_eq!(first.bytes(), second.bytes());
}

#[test]
fn fingerprint_is_stable_for_equal_inputs() {
  let overrides = PackageOverrides::default();
  assert_eq!(
    fingerprint(app_with(app_target(), "print(1)\n"), &overrides),
    fingerprint(app_with(app_target(), "print(1)\n"), &overrides)
  );
}

#[test]
fn every_artifact_input_changes_the_fingerprint() {
  let overrides = PackageOverrides::default();
  let base = fingerprint(app_with(app_target(), "print(1)\n"), &overrides);

  let variants = [
    ("source content", app_with(app_target(), "print(2)\n")),
    ("args", app_with(app_target().with_args(["--verbose"]), "print(1)\n")),
    ("env", app_with(app_target().with_env([EnvVar::new("K", "V")]), "print(1)\n")),
    (
      "requirements",
      app_with(app_target().with_requirements([req("r2==2.0")]), "print(1)\n"),
    ),
    ("entry point", app_with(app_target().with_entry_point("main.py:run"), "print(1)\n")),
    (
      "interpreter constraints",
      app_with(
        app_target().with_interpreter_constraints(">=3.10".parse().unwrap()),
        "print(1)\n",
      ),
    ),
    ("output path", app_with(app_target().with_output_path("bin/app.pex"), "print(1)\n")),
  ];

  for (what, project) in variants {
    assert_ne!(fingerprint(project, &overrides), base, "{what} did not change the fingerprint");
  }

  let venv = PackageOverrides {
    execution_mode: Some(ExecutionMode::Venv),
    ..PackageOverrides::default()
  };
  assert_ne!(fingerprint(app_with(app_target(), "print(1)\n"), &venv), base);
}

#[test]
fn declaration_order_of_dependencies_does_not_matter_for_content() {
  let project = |deps: [&str; 2]| {
    Fixture::new()
      .target(
        Target::new(addr("src/app"))
          .with_sources(["main.py"])
          .with_dependencies(deps.map(addr)),
      )
      .target(Target::new(addr("x")).with_sources(["x.py"]))
      .target(Target::new(addr("y")).with_sources(["y.py"]))
      .file("src/app/main.py", "")
      .file("x/x.py", "x")
      .file("y/y.py", "y")
  };

  let overrides = PackageOverrides::default();
  assert_eq!(
    fingerprint(project(["x", "y"]), &overrides),
    fingerprint(project(["y", "x"]), &overrides)
  );
}

#[tokio::test]
async fn artifact_round_trips_through_its_bytes() {
  let (project, sources) = simple_app().build();
  let artifact = packager()
    .package(&project.model(&sources), &addr("src/app"), &PackageOverrides::default())
    .await
    .unwrap();

  let reread = Artifact::from_bytes(artifact.bytes().to_vec()).unwrap();
  assert_eq!(reread.fingerprint, artifact.fingerprint);
  assert_eq!(reread.relpath, artifact.relpath);
  assert_eq!(reread.record, artifact.record);
}
