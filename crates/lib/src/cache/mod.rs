//! Single-flight build cache.
//!
//! Artifacts are keyed by [`Fingerprint`]. At most one build per fingerprint
//! runs at a time: the first caller registers an in-flight slot and spawns
//! the build, later callers wait on the slot's watch channel. The slot map
//! lock is only held to inspect or update a slot, never across an await.
//!
//! Builds run in their own task, so a caller that is dropped mid-wait does
//! not cancel a build other callers are waiting for. Successful builds stay
//! cached for the lifetime of the cache; failed builds leave no slot behind
//! and the next request retries.

mod store;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::artifact::Artifact;
use crate::assemble::AssemblyError;
use crate::fingerprint::Fingerprint;

pub use store::{ArtifactMarker, ArtifactStore, FsStore, MemoryStore};

type BuildOutcome = Result<Arc<Artifact>, Arc<AssemblyError>>;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
  #[error("artifact build failed: {0}")]
  Build(#[source] Arc<AssemblyError>),

  #[error("build of {fingerprint} ended without a result")]
  Abandoned { fingerprint: Fingerprint },
}

impl CacheError {
  /// Whether asking again could succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Build(e) => e.is_transient(),
      Self::Abandoned { .. } => true,
    }
  }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  /// Requests answered from a ready slot.
  pub hits: u64,
  /// Builds satisfied by the artifact store.
  pub store_hits: u64,
  /// Builds that ran the assembler.
  pub builds: u64,
  pub failures: u64,
  /// Requests that waited on an in-flight build.
  pub joined: u64,
}

#[derive(Default)]
struct Counters {
  hits: AtomicU64,
  store_hits: AtomicU64,
  builds: AtomicU64,
  failures: AtomicU64,
  joined: AtomicU64,
}

impl Counters {
  fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }
}

enum Slot {
  InFlight(watch::Receiver<Option<BuildOutcome>>),
  Ready(Arc<Artifact>),
}

struct CacheInner {
  slots: Mutex<HashMap<Fingerprint, Slot>>,
  store: Arc<dyn ArtifactStore>,
  counters: Counters,
}

impl CacheInner {
  fn slots(&self) -> MutexGuard<'_, HashMap<Fingerprint, Slot>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Removes an in-flight slot if the build task unwinds before settling it.
struct SlotGuard<'a> {
  inner: &'a CacheInner,
  fingerprint: &'a Fingerprint,
  armed: bool,
}

impl Drop for SlotGuard<'_> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let mut slots = self.inner.slots();
    if matches!(slots.get(self.fingerprint), Some(Slot::InFlight(_))) {
      slots.remove(self.fingerprint);
    }
  }
}

/// Process-scoped artifact cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BuildCache {
  inner: Arc<CacheInner>,
}

impl BuildCache {
  pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
    Self {
      inner: Arc::new(CacheInner {
        slots: Mutex::new(HashMap::new()),
        store,
        counters: Counters::default(),
      }),
    }
  }

  /// Cache backed by a [`MemoryStore`].
  pub fn in_memory() -> Self {
    Self::new(Arc::new(MemoryStore::new()))
  }

  pub fn store(&self) -> &Arc<dyn ArtifactStore> {
    &self.inner.store
  }

  pub fn stats(&self) -> CacheStats {
    let c = &self.inner.counters;
    CacheStats {
      hits: c.hits.load(Ordering::Relaxed),
      store_hits: c.store_hits.load(Ordering::Relaxed),
      builds: c.builds.load(Ordering::Relaxed),
      failures: c.failures.load(Ordering::Relaxed),
      joined: c.joined.load(Ordering::Relaxed),
    }
  }

  /// The ready artifact for `fingerprint`, if any.
  pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Artifact>> {
    match self.inner.slots().get(fingerprint) {
      Some(Slot::Ready(artifact)) => Some(artifact.clone()),
      _ => None,
    }
  }

  /// Return the artifact for `fingerprint`, building it with `build` unless
  /// it is cached, stored, or already being built.
  pub async fn get_or_build<F, Fut>(&self, fingerprint: &Fingerprint, build: F) -> Result<Arc<Artifact>, CacheError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Artifact, AssemblyError>> + Send + 'static,
  {
    let mut rx = {
      let mut slots = self.inner.slots();
      match slots.get(fingerprint) {
        Some(Slot::Ready(artifact)) => {
          Counters::bump(&self.inner.counters.hits);
          debug!(fingerprint = %fingerprint.short(), "cache hit");
          return Ok(artifact.clone());
        }
        Some(Slot::InFlight(rx)) => {
          Counters::bump(&self.inner.counters.joined);
          debug!(fingerprint = %fingerprint.short(), "joining in-flight build");
          rx.clone()
        }
        None => {
          let (tx, rx) = watch::channel(None);
          slots.insert(fingerprint.clone(), Slot::InFlight(rx.clone()));
          tokio::spawn(run_build(self.inner.clone(), fingerprint.clone(), tx, build));
          rx
        }
      }
    };

    let abandoned = || CacheError::Abandoned {
      fingerprint: fingerprint.clone(),
    };
    let outcome = rx.wait_for(Option::is_some).await.map_err(|_| abandoned())?.clone();
    match outcome {
      Some(Ok(artifact)) => Ok(artifact),
      Some(Err(e)) => Err(CacheError::Build(e)),
      None => Err(abandoned()),
    }
  }
}

async fn run_build<F, Fut>(
  inner: Arc<CacheInner>,
  fingerprint: Fingerprint,
  tx: watch::Sender<Option<BuildOutcome>>,
  build: F,
) where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Artifact, AssemblyError>>,
{
  let mut guard = SlotGuard {
    inner: &inner,
    fingerprint: &fingerprint,
    armed: true,
  };

  let outcome = load_or_build(&inner, &fingerprint, build).await.map_err(Arc::new);

  {
    let mut slots = inner.slots();
    match &outcome {
      Ok(artifact) => {
        slots.insert(fingerprint.clone(), Slot::Ready(artifact.clone()));
      }
      Err(e) => {
        Counters::bump(&inner.counters.failures);
        error!(fingerprint = %fingerprint.short(), error = %e, "artifact build failed");
        slots.remove(&fingerprint);
      }
    }
  }
  guard.armed = false;
  tx.send_replace(Some(outcome));
}

async fn load_or_build<F, Fut>(
  inner: &CacheInner,
  fingerprint: &Fingerprint,
  build: F,
) -> Result<Arc<Artifact>, AssemblyError>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Artifact, AssemblyError>>,
{
  if let Some(artifact) = load_stored(inner, fingerprint).await {
    Counters::bump(&inner.counters.store_hits);
    debug!(fingerprint = %fingerprint.short(), "loaded artifact from store");
    return Ok(Arc::new(artifact));
  }

  Counters::bump(&inner.counters.builds);
  debug!(fingerprint = %fingerprint.short(), "building artifact");
  let artifact = build().await?;

  let store = inner.store.clone();
  let key = fingerprint.clone();
  let stored = tokio::task::spawn_blocking(move || {
    let location = store.put(&key, artifact.bytes())?;
    Ok::<_, std::io::Error>(artifact.with_location(location))
  })
  .await
  .map_err(|e| AssemblyError::Task(e.to_string()))??;

  Ok(Arc::new(stored))
}

/// A stored artifact whose embedded fingerprint matches, or `None`.
async fn load_stored(inner: &CacheInner, fingerprint: &Fingerprint) -> Option<Artifact> {
  let store = inner.store.clone();
  let key = fingerprint.clone();
  let lookup = tokio::task::spawn_blocking(move || {
    let bytes = store.get(&key)?;
    Ok::<_, std::io::Error>(bytes.map(|bytes| (bytes, store.locate(&key))))
  })
  .await;

  let (bytes, location) = match lookup {
    Ok(Ok(Some(found))) => found,
    Ok(Ok(None)) => return None,
    Ok(Err(e)) => {
      warn!(fingerprint = %fingerprint.short(), error = %e, "artifact store lookup failed, rebuilding");
      return None;
    }
    Err(e) => {
      warn!(fingerprint = %fingerprint.short(), error = %e, "artifact store lookup panicked, rebuilding");
      return None;
    }
  };

  match Artifact::from_bytes(bytes) {
    Ok(artifact) if &artifact.fingerprint == fingerprint => Some(match location {
      Some(location) => artifact.with_location(location),
      None => artifact,
    }),
    Ok(artifact) => {
      warn!(
        expected = %fingerprint.short(),
        actual = %artifact.fingerprint.short(),
        "stored artifact has a different fingerprint, rebuilding"
      );
      None
    }
    Err(e) => {
      warn!(fingerprint = %fingerprint.short(), error = %e, "stored artifact unreadable, rebuilding");
      None
    }
  }
}
