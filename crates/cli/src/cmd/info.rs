use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use pakt_lib::consts::{HOST_PLATFORM_ENV, STORE_ENV};
use pakt_lib::package::PackageConfig;
use pakt_lib::platform::paths::store_dir;

use crate::output::{OutputFormat, print_heading, print_json, print_stat};

#[derive(Serialize)]
struct Info {
  version: &'static str,
  host_platform: Option<String>,
  host_platform_source: &'static str,
  store: PathBuf,
  parallelism: usize,
  interpreter: String,
}

pub fn cmd_info(store: Option<&Path>, output: OutputFormat) -> Result<()> {
  let config = PackageConfig::from_env();
  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    host_platform: config.host_platform().ok().map(|tag| tag.to_string()),
    host_platform_source: if config.host_platform.is_some() {
      HOST_PLATFORM_ENV
    } else {
      "detected"
    },
    store: store.map(Path::to_path_buf).unwrap_or_else(store_dir),
    parallelism: config.parallelism,
    interpreter: config.interpreter,
  };

  if output.is_json() {
    return print_json(&info);
  }

  print_heading(&format!("pakt {}", info.version));
  match &info.host_platform {
    Some(tag) => print_stat("Host platform", &format!("{tag} ({})", info.host_platform_source)),
    None => print_stat("Host platform", &format!("unknown (set {HOST_PLATFORM_ENV})")),
  }
  print_stat("Store", &format!("{} (override with --store or {STORE_ENV})", info.store.display()));
  print_stat("Parallelism", &info.parallelism.to_string());
  print_stat("Interpreter", &info.interpreter);
  Ok(())
}
