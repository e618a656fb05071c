//! Build cache behavior across packagers and stores.

use std::fs;
use std::sync::Arc;

use pakt_lib::cache::{ArtifactStore, FsStore, MemoryStore};
use pakt_lib::package::{PackageOverrides, Packager};
use tempfile::TempDir;

use super::common::{addr, config, packager, packager_with_store, simple_app};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_plan_build_once() {
  let (project, sources) = simple_app().build();
  let packager = packager();
  let plan = packager
    .plan(&project.model(&sources), &addr("src/app"), &PackageOverrides::default())
    .unwrap();

  let handles: Vec<_> = (0..8).map(|_| tokio::spawn(packager.build(plan.clone()))).collect();
  let mut artifacts = Vec::new();
  for handle in handles {
    artifacts.push(handle.await.unwrap().unwrap());
  }

  assert!(artifacts.iter().all(|a| Arc::ptr_eq(a, &artifacts[0])));
  let stats = packager.cache().stats();
  assert_eq!(stats.builds, 1);
  assert_eq!(stats.hits + stats.joined, 7);
}

#[tokio::test]
async fn package_all_shares_builds_between_duplicate_addresses() {
  let (project, sources) = simple_app().build();
  let packager = packager();
  let addresses = vec![addr("src/app"), addr("src/app:app"), addr("src/app")];

  let results = packager
    .package_all(&project.model(&sources), &addresses, &PackageOverrides::default())
    .await;

  assert_eq!(results.len(), 3);
  let first = results[0].1.as_ref().unwrap();
  for (_, result) in &results {
    assert!(Arc::ptr_eq(result.as_ref().unwrap(), first));
  }
  assert_eq!(packager.cache().stats().builds, 1);
}

#[tokio::test]
async fn fs_store_serves_a_fresh_packager() {
  let temp = TempDir::new().unwrap();
  let (project, sources) = simple_app().build();
  let model = project.model(&sources);
  let overrides = PackageOverrides::default();

  let first = packager_with_store(Arc::new(FsStore::new(temp.path())))
    .package(&model, &addr("src/app"), &overrides)
    .await
    .unwrap();

  let second_packager = packager_with_store(Arc::new(FsStore::new(temp.path())));
  let second = second_packager.package(&model, &addr("src/app"), &overrides).await.unwrap();

  assert_eq!(first.bytes(), second.bytes());
  assert_eq!(second_packager.cache().stats().store_hits, 1);
  assert_eq!(second_packager.cache().stats().builds, 0);
  assert_eq!(
    second.location.as_deref(),
    Some(FsStore::new(temp.path()).entry_dir(&first.fingerprint).join("artifact.bin").as_path())
  );
}

#[tokio::test]
async fn corrupted_store_entry_is_rebuilt() {
  let temp = TempDir::new().unwrap();
  let (project, sources) = simple_app().build();
  let model = project.model(&sources);
  let overrides = PackageOverrides::default();

  let original = packager_with_store(Arc::new(FsStore::new(temp.path())))
    .package(&model, &addr("src/app"), &overrides)
    .await
    .unwrap();
  let stored = original.location.clone().unwrap();
  fs::write(&stored, b"garbage").unwrap();

  let packager = packager_with_store(Arc::new(FsStore::new(temp.path())));
  let rebuilt = packager.package(&model, &addr("src/app"), &overrides).await.unwrap();

  assert_eq!(packager.cache().stats().builds, 1);
  assert_eq!(packager.cache().stats().store_hits, 0);
  assert_eq!(rebuilt.bytes(), original.bytes());
  assert_eq!(fs::read(&stored).unwrap(), original.bytes());
}

#[tokio::test]
async fn memory_store_is_filled_once_per_fingerprint() {
  let store = Arc::new(MemoryStore::new());
  let (project, sources) = simple_app().build();
  let packager = Packager::new(config(), pakt_lib::cache::BuildCache::new(store.clone()));

  for _ in 0..3 {
    packager
      .package(&project.model(&sources), &addr("src/app"), &PackageOverrides::default())
      .await
      .unwrap();
  }

  assert_eq!(store.len(), 1);
  assert_eq!(packager.cache().stats().hits, 2);
}

#[tokio::test]
async fn written_artifact_matches_cached_bytes() {
  let temp = TempDir::new().unwrap();
  let (project, sources) = simple_app().build();
  let artifact = packager()
    .package(&project.model(&sources), &addr("src/app"), &PackageOverrides::default())
    .await
    .unwrap();

  let path = artifact.write_to(temp.path()).unwrap();
  assert_eq!(path, temp.path().join("src.app").join("app.pex"));

  let written = fs::read(&path).unwrap();
  assert_eq!(written, artifact.bytes());
  assert!(written.starts_with(b"#!/usr/bin/env python3\n"));

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
  }

  // Rewriting replaces the file in place.
  assert_eq!(artifact.write_to(temp.path()).unwrap(), path);
}

#[test]
fn store_trait_objects_are_interchangeable() {
  let temp = TempDir::new().unwrap();
  let memory: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::new());
  let fs_store: Arc<dyn ArtifactStore> = Arc::new(FsStore::new(temp.path()));
  let fingerprint = pakt_lib::fingerprint::Fingerprint::from_hex(&"f".repeat(64)).unwrap();

  for store in [memory, fs_store] {
    assert!(store.get(&fingerprint).unwrap().is_none());
    store.put(&fingerprint, b"bytes").unwrap();
    assert_eq!(store.get(&fingerprint).unwrap().unwrap(), b"bytes");
  }
}
