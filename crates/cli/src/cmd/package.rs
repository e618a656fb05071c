//! Implementation of the `pakt package` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;
use tracing::info;

use pakt_lib::cache::{BuildCache, FsStore};
use pakt_lib::package::{PackageConfig, PackageOverrides, Packager};
use pakt_lib::platform::PlatformTag;
use pakt_lib::target::{Address, ExecutionMode};

use super::load_project;
use crate::output::{
  OutputFormat, format_bytes, format_elapsed, print_error, print_info, print_json, print_stat, print_success, symbols,
};

#[derive(Args, Debug)]
pub struct PackageArgs {
  /// Project file or directory containing pakt.json
  pub project: PathBuf,

  /// Targets to package (e.g. src/app:app)
  #[arg(required = true)]
  pub addresses: Vec<Address>,

  /// Directory artifacts are written to
  #[arg(long, default_value = "dist")]
  pub out: PathBuf,

  /// Build for these platform tags instead of the declared ones
  #[arg(long = "platform")]
  pub platforms: Vec<PlatformTag>,

  /// Execution mode override (zipapp or venv)
  #[arg(long)]
  pub mode: Option<ExecutionMode>,

  /// Maximum number of artifacts assembled in parallel
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

#[derive(Serialize)]
struct Packaged {
  address: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  path: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  fingerprint: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  bytes: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
}

/// Execute the package command.
///
/// Packages every requested target, writes the artifacts under `--out` and
/// fails if any target could not be packaged.
pub fn cmd_package(args: PackageArgs, store: Option<&Path>) -> Result<()> {
  let start = Instant::now();
  let project = load_project(&args.project)?;

  let mut config = PackageConfig::from_env();
  if let Some(jobs) = args.jobs {
    config.parallelism = jobs;
  }
  let store = match store {
    Some(dir) => FsStore::new(dir),
    None => FsStore::at_default_location(),
  };
  info!(store = %store.root().display(), "using artifact store");

  let packager = Packager::new(config, BuildCache::new(Arc::new(store)));
  let sources = project.sources();
  let model = project.model(&sources);
  let overrides = PackageOverrides {
    platforms: (!args.platforms.is_empty()).then(|| args.platforms.clone()),
    execution_mode: args.mode,
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let results = rt.block_on(packager.package_all(&model, &args.addresses, &overrides));

  let mut report = Vec::with_capacity(results.len());
  for (address, result) in results {
    let entry = match result.map_err(anyhow::Error::from).and_then(|artifact| {
      let path = artifact
        .write_to(&args.out)
        .with_context(|| format!("Failed to write artifact to {}", args.out.display()))?;
      Ok((artifact, path))
    }) {
      Ok((artifact, path)) => Packaged {
        address: address.to_string(),
        path: Some(path),
        fingerprint: Some(artifact.fingerprint.to_string()),
        bytes: Some(artifact.bytes().len() as u64),
        error: None,
      },
      Err(e) => Packaged {
        address: address.to_string(),
        path: None,
        fingerprint: None,
        bytes: None,
        error: Some(format!("{e:#}")),
      },
    };
    report.push(entry);
  }

  let failed = report.iter().filter(|entry| entry.error.is_some()).count();
  if args.output.is_json() {
    print_json(&report)?;
  } else {
    for entry in &report {
      match (&entry.path, &entry.error) {
        (Some(path), None) => print_success(&format!(
          "{} {} {} ({}, {})",
          entry.address,
          symbols::ARROW,
          path.display(),
          format_bytes(entry.bytes.unwrap_or_default()),
          entry.fingerprint.as_deref().map(short).unwrap_or_default()
        )),
        (_, Some(error)) => print_error(&format!("{}: {}", entry.address, error)),
        (None, None) => {}
      }
    }
    let stats = packager.cache().stats();
    println!();
    print_info("Packaging complete");
    print_stat("Targets", &report.len().to_string());
    print_stat("Built", &stats.builds.to_string());
    print_stat("From store", &stats.store_hits.to_string());
    print_stat("Duration", &format_elapsed(start.elapsed()));
  }

  if failed > 0 {
    bail!("{failed} of {} target(s) failed to package", report.len());
  }
  Ok(())
}

fn short(fingerprint: &str) -> &str {
  &fingerprint[..fingerprint.len().min(12)]
}
