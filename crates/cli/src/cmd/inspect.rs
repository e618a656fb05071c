//! Implementation of the `pakt inspect` command.
//!
//! Resolves a target the same way `pakt package` does and prints the plan
//! without assembling anything.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use pakt_lib::entry_point::ResolvedEntryPoint;
use pakt_lib::package::{PackageConfig, PackageOverrides, PackagePlan, Packager};
use pakt_lib::platform::PlatformTag;
use pakt_lib::target::{Address, ExecutionMode};

use super::load_project;
use crate::output::{OutputFormat, format_bytes, print_heading, print_json, print_stat};

#[derive(Serialize)]
struct Inspection<'a> {
  address: String,
  fingerprint: &'a str,
  entry_point: &'a ResolvedEntryPoint,
  constraints: String,
  platforms: Vec<&'a str>,
  cross_build: bool,
  execution_mode: ExecutionMode,
  output_path: &'a str,
  targets: Vec<String>,
  files: Vec<InspectedFile<'a>>,
  requirements: Vec<InspectedRequirement>,
}

#[derive(Serialize)]
struct InspectedFile<'a> {
  path: &'a str,
  archive_path: &'a str,
  owner: String,
  bytes: usize,
}

#[derive(Serialize)]
struct InspectedRequirement {
  pin: String,
  constraint: String,
  required_by: Vec<String>,
  native: bool,
}

impl<'a> Inspection<'a> {
  fn new(plan: &'a PackagePlan) -> Self {
    let closure = &plan.closure;
    Self {
      address: plan.root.to_string(),
      fingerprint: plan.fingerprint.as_str(),
      entry_point: &plan.entry_point,
      constraints: plan.constraints.to_string(),
      platforms: plan.platforms.tags.iter().map(PlatformTag::as_str).collect(),
      cross_build: plan.platforms.is_cross_build(),
      execution_mode: plan.execution_mode,
      output_path: &plan.output_path,
      targets: closure.targets.iter().map(ToString::to_string).collect(),
      files: closure
        .files
        .iter()
        .map(|file| InspectedFile {
          path: &file.path,
          archive_path: &file.archive_path,
          owner: file.owner.to_string(),
          bytes: file.content.len(),
        })
        .collect(),
      requirements: closure
        .requirements
        .iter()
        .map(|requirement| InspectedRequirement {
          pin: requirement.resolved.pin(),
          constraint: requirement.constraint.to_string(),
          required_by: requirement
            .contributions
            .iter()
            .map(|c| c.origin.to_string())
            .collect(),
          native: requirement.resolved.native,
        })
        .collect(),
    }
  }
}

pub fn cmd_inspect(project: &Path, address: &Address, mode: Option<ExecutionMode>, output: OutputFormat) -> Result<()> {
  let project = load_project(project)?;
  let sources = project.sources();
  let overrides = PackageOverrides {
    platforms: None,
    execution_mode: mode,
  };
  let plan = Packager::plan_with(&PackageConfig::from_env(), &project.model(&sources), address, &overrides)
    .with_context(|| format!("Failed to resolve {address}"))?;
  let inspection = Inspection::new(&plan);

  if output.is_json() {
    return print_json(&inspection);
  }

  print_heading(&inspection.address);
  print_stat("Fingerprint", inspection.fingerprint);
  print_stat("Entry point", &inspection.entry_point.to_string());
  print_stat("Interpreter", &inspection.constraints);
  let platforms = inspection.platforms.join(", ");
  if inspection.cross_build {
    print_stat("Platforms", &format!("{platforms} (cross-build)"));
  } else {
    print_stat("Platforms", &platforms);
  }
  print_stat("Mode", inspection.execution_mode.as_str());
  print_stat("Output", inspection.output_path);

  println!();
  print_heading(&format!("Targets ({})", inspection.targets.len()));
  for target in &inspection.targets {
    println!("  {target}");
  }

  println!();
  print_heading(&format!(
    "Files ({}, {})",
    inspection.files.len(),
    format_bytes(plan.closure.total_bytes() as u64)
  ));
  for file in &inspection.files {
    println!("  {} [{}]", file.archive_path, file.owner);
  }

  if !inspection.requirements.is_empty() {
    println!();
    print_heading(&format!("Requirements ({})", inspection.requirements.len()));
    for requirement in &inspection.requirements {
      let native = if requirement.native { ", native" } else { "" };
      println!(
        "  {} ({}{}; from {})",
        requirement.pin,
        requirement.constraint,
        native,
        requirement.required_by.join(", ")
      );
    }
  }

  Ok(())
}
