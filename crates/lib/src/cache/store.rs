//! Persistent artifact storage.
//!
//! The filesystem layout is:
//! ```text
//! <root>/artifacts/<fingerprint>/artifact.bin
//! <root>/artifacts/<fingerprint>/.pakt-complete
//! ```
//! The completion marker holds the SHA-256 of `artifact.bin` and is written
//! last. An entry without a marker is incomplete; an entry whose bytes do not
//! match the marker is corrupt. Both read as absent.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::consts::{ARTIFACT_COMPLETE_MARKER, ARTIFACT_FILE, ARTIFACT_MARKER_VERSION};
use crate::fingerprint::Fingerprint;
use crate::platform::paths::store_dir;
use crate::util::hash::hash_bytes;

/// Content-addressed storage for artifact bytes.
///
/// Implementations block; the cache calls them from `spawn_blocking`.
pub trait ArtifactStore: Send + Sync {
  /// Store `bytes` under `fingerprint` and return where they live.
  fn put(&self, fingerprint: &Fingerprint, bytes: &[u8]) -> io::Result<PathBuf>;

  /// Fetch previously stored bytes. `Ok(None)` when absent.
  fn get(&self, fingerprint: &Fingerprint) -> io::Result<Option<Vec<u8>>>;

  /// Location of a stored entry, if the store has one on disk.
  fn locate(&self, _fingerprint: &Fingerprint) -> Option<PathBuf> {
    None
  }
}

/// Process-local store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<Fingerprint, Vec<u8>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl ArtifactStore for MemoryStore {
  fn put(&self, fingerprint: &Fingerprint, bytes: &[u8]) -> io::Result<PathBuf> {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(fingerprint.clone(), bytes.to_vec());
    Ok(PathBuf::from("memory").join(fingerprint.as_str()))
  }

  fn get(&self, fingerprint: &Fingerprint) -> io::Result<Option<Vec<u8>>> {
    Ok(
      self
        .entries
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(fingerprint)
        .cloned(),
    )
  }
}

/// Completion marker written next to each stored artifact.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactMarker {
  pub version: u32,
  /// Always "complete".
  pub status: String,
  /// SHA-256 of `artifact.bin`.
  pub output_hash: String,
}

/// Store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStore {
  root: PathBuf,
}

impl FsStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Store under `PAKT_STORE` or the user cache directory.
  pub fn at_default_location() -> Self {
    Self::new(store_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Directory holding one artifact entry.
  pub fn entry_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
    self.root.join("artifacts").join(fingerprint.as_str())
  }

  fn read_marker(dir: &Path) -> io::Result<Option<ArtifactMarker>> {
    let content = match fs::read_to_string(dir.join(ARTIFACT_COMPLETE_MARKER)) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e),
    };
    match serde_json::from_str(&content) {
      Ok(marker) => Ok(Some(marker)),
      Err(e) => {
        warn!(path = ?dir, error = %e, "unreadable artifact marker, ignoring entry");
        Ok(None)
      }
    }
  }

  fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
  }
}

impl ArtifactStore for FsStore {
  fn put(&self, fingerprint: &Fingerprint, bytes: &[u8]) -> io::Result<PathBuf> {
    let dir = self.entry_dir(fingerprint);
    fs::create_dir_all(&dir)?;

    // A stale marker must not vouch for the new bytes while they are written.
    match fs::remove_file(dir.join(ARTIFACT_COMPLETE_MARKER)) {
      Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
      _ => {}
    }
    Self::write_atomic(&dir, ARTIFACT_FILE, bytes)?;

    let marker = ArtifactMarker {
      version: ARTIFACT_MARKER_VERSION,
      status: "complete".to_string(),
      output_hash: hash_bytes(bytes).0,
    };
    let content = serde_json::to_string(&marker).map_err(io::Error::other)?;
    Self::write_atomic(&dir, ARTIFACT_COMPLETE_MARKER, format!("{content}\n").as_bytes())?;

    debug!(path = ?dir, bytes = bytes.len(), "stored artifact");
    Ok(dir.join(ARTIFACT_FILE))
  }

  fn get(&self, fingerprint: &Fingerprint) -> io::Result<Option<Vec<u8>>> {
    let dir = self.entry_dir(fingerprint);
    let Some(marker) = Self::read_marker(&dir)? else {
      return Ok(None);
    };

    let bytes = match fs::read(dir.join(ARTIFACT_FILE)) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e),
    };

    let actual = hash_bytes(&bytes);
    if actual.0 != marker.output_hash {
      warn!(
        path = ?dir,
        expected = %marker.output_hash,
        actual = %actual,
        "stored artifact corrupted, discarding"
      );
      fs::remove_dir_all(&dir)?;
      return Ok(None);
    }
    Ok(Some(bytes))
  }

  fn locate(&self, fingerprint: &Fingerprint) -> Option<PathBuf> {
    let path = self.entry_dir(fingerprint).join(ARTIFACT_FILE);
    path.exists().then_some(path)
  }
}
