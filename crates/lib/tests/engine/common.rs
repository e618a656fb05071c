//! Shared fixtures for the engine integration tests.

use std::sync::Arc;

use pakt_lib::cache::{ArtifactStore, BuildCache};
use pakt_lib::package::{PackageConfig, Packager};
use pakt_lib::platform::PlatformTag;
use pakt_lib::requirement::ResolvedRequirement;
use pakt_lib::target::Target;

pub use pakt_lib::util::testutil::{Fixture, addr, req, ver};

pub const HOST: &str = "linux-x86_64";

pub fn tag(s: &str) -> PlatformTag {
  PlatformTag::new(s)
}

/// Configuration pinned to a fixed host so tests do not depend on the machine.
pub fn config() -> PackageConfig {
  PackageConfig {
    host_platform: Some(tag(HOST)),
    parallelism: 4,
    ..PackageConfig::default()
  }
}

pub fn packager() -> Packager {
  Packager::new(config(), BuildCache::in_memory())
}

pub fn packager_with_store(store: Arc<dyn ArtifactStore>) -> Packager {
  Packager::new(config(), BuildCache::new(store))
}

/// `app` with a `main.py` entry point and a pure `r==1.0` requirement.
pub fn simple_app() -> Fixture {
  Fixture::new()
    .source_root("src")
    .target(
      Target::new(addr("src/app"))
        .with_sources(["main.py"])
        .with_requirements([req("r==1.0")])
        .with_entry_point("main.py"),
    )
    .file("src/app/main.py", "print('hello')\n")
    .lock(ResolvedRequirement::pure("r", ver("1.0")))
}
