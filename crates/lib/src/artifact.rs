//! Built artifacts.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use zip::ZipArchive;

use crate::assemble::{AssemblyError, LauncherRecord};
use crate::consts::{LAUNCHER_FORMAT, LAUNCHER_RECORD};
use crate::entry_point::ResolvedEntryPoint;
use crate::fingerprint::Fingerprint;
use crate::platform::PlatformTag;
use crate::target::ExecutionMode;

/// An immutable, assembled artifact.
///
/// Created once per fingerprint and shared through the build cache.
#[derive(Clone)]
pub struct Artifact {
  pub fingerprint: Fingerprint,
  /// Output path relative to the distribution directory.
  pub relpath: String,
  pub record: LauncherRecord,
  bytes: Arc<[u8]>,
  /// Where the artifact store keeps these bytes, if anywhere.
  pub location: Option<PathBuf>,
}

impl Artifact {
  pub(crate) fn new(record: LauncherRecord, bytes: Vec<u8>) -> Self {
    Self {
      fingerprint: record.fingerprint.clone(),
      relpath: record.output_path.clone(),
      record,
      bytes: bytes.into(),
      location: None,
    }
  }

  /// Rebuild an artifact from its bytes by reading the embedded launcher record.
  pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AssemblyError> {
    let mut archive = open_archive(&bytes)?;
    let mut json = Vec::new();
    match archive.by_name(LAUNCHER_RECORD) {
      Ok(mut file) => file.read_to_end(&mut json)?,
      Err(zip::result::ZipError::FileNotFound) => return Err(AssemblyError::MissingRecord),
      Err(e) => return Err(e.into()),
    };

    let record: LauncherRecord = serde_json::from_slice(&json)?;
    if record.format != LAUNCHER_FORMAT {
      return Err(AssemblyError::UnsupportedFormat(record.format));
    }
    Ok(Self::new(record, bytes))
  }

  pub(crate) fn with_location(mut self, location: PathBuf) -> Self {
    self.location = Some(location);
    self
  }

  pub fn entry_point(&self) -> &ResolvedEntryPoint {
    &self.record.entry_point
  }

  pub fn platforms(&self) -> &BTreeSet<PlatformTag> {
    &self.record.platforms
  }

  pub fn execution_mode(&self) -> ExecutionMode {
    self.record.execution_mode
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// Archive member names in stored order.
  pub fn member_names(&self) -> Result<Vec<String>, AssemblyError> {
    let mut archive = open_archive(&self.bytes)?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
      names.push(archive.by_index(index)?.name().to_string());
    }
    Ok(names)
  }

  pub fn read_member(&self, name: &str) -> Result<Vec<u8>, AssemblyError> {
    let mut archive = open_archive(&self.bytes)?;
    let mut file = archive.by_name(name)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
  }

  /// Write the artifact to `dir/<relpath>`, replacing any previous file.
  ///
  /// Zipapp artifacts are made executable on unix.
  pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
    let dest = dir.join(&self.relpath);
    let parent = dest.parent().unwrap_or(dir);
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&self.bytes)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    if self.execution_mode() == ExecutionMode::ZipApp {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o755))?;
    }

    tmp.persist(&dest).map_err(|e| e.error)?;
    Ok(dest)
  }
}

impl fmt::Debug for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Artifact")
      .field("fingerprint", &self.fingerprint)
      .field("relpath", &self.relpath)
      .field("entry_point", &self.record.entry_point)
      .field("bytes", &self.bytes.len())
      .field("location", &self.location)
      .finish_non_exhaustive()
  }
}

/// Opens the zip part of an artifact, skipping a `#!` preamble line.
fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, AssemblyError> {
  let start = if bytes.starts_with(b"#!") {
    bytes.iter().position(|&b| b == b'\n').map_or(bytes.len(), |newline| newline + 1)
  } else {
    0
  };
  Ok(ZipArchive::new(Cursor::new(&bytes[start..]))?)
}
