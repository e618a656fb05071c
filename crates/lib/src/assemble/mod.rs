//! Deterministic artifact assembly.
//!
//! An artifact is a zip archive holding the closure's sources, a launcher
//! record, the requirement pins and a `__main__.py` stub. The output depends
//! only on the plan:
//! - members are written in byte-wise sorted order, files only
//! - every member has the 1980-01-01 zip epoch as its timestamp
//! - permissions are fixed at 0644, 0755 for the stub
//!
//! Zipapp artifacts start with a `#!` line so they can be executed directly.

mod launcher;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};

use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::artifact::Artifact;
use crate::consts::{INTERACTIVE_MARKER, LAUNCHER_RECORD, MAIN_STUB, METADATA_DIR, REQUIREMENTS_FILE, VENV_LIB_DIR};
use crate::entry_point::ResolvedEntryPoint;
use crate::package::PackagePlan;
use crate::target::ExecutionMode;

pub use launcher::{INTERACTIVE_MAIN, LauncherRecord, VENV_MAIN, ZIPAPP_MAIN};

const FILE_MODE: u32 = 0o644;
const STUB_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum AssemblyError {
  #[error("artifact i/o failed: {0}")]
  Io(#[from] io::Error),

  #[error("archive error: {0}")]
  Zip(#[from] ZipError),

  #[error("invalid launcher record: {0}")]
  Record(#[from] serde_json::Error),

  #[error("artifact has no launcher record")]
  MissingRecord,

  #[error("unsupported launcher record format {0}")]
  UnsupportedFormat(u32),

  #[error("source {0} collides with a reserved archive path")]
  ReservedPath(String),

  #[error("assembly task failed: {0}")]
  Task(String),
}

impl AssemblyError {
  /// Whether retrying the same build could succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Io(_) | Self::Zip(ZipError::Io(_)))
  }
}

struct Member<'a> {
  data: Cow<'a, [u8]>,
  mode: u32,
}

/// Writes artifacts for package plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactAssembler;

impl ArtifactAssembler {
  pub fn new() -> Self {
    Self
  }

  /// Assemble the artifact for `plan`. Blocking; callers on an async
  /// runtime run it under `spawn_blocking`.
  pub fn assemble(&self, plan: &PackagePlan) -> Result<Artifact, AssemblyError> {
    let record = LauncherRecord::from_plan(plan);
    let members = Self::members(plan, &record)?;
    let archive = write_zip(&members)?;

    let bytes = match plan.execution_mode {
      ExecutionMode::ZipApp => {
        let mut bytes = format!("#!/usr/bin/env {}\n", plan.interpreter).into_bytes();
        bytes.extend_from_slice(&archive);
        bytes
      }
      ExecutionMode::Venv => archive,
    };

    debug!(
      fingerprint = %plan.fingerprint.short(),
      members = members.len(),
      bytes = bytes.len(),
      mode = %plan.execution_mode,
      "assembled artifact"
    );

    Ok(Artifact::new(record, bytes))
  }

  fn members<'a>(
    plan: &'a PackagePlan,
    record: &LauncherRecord,
  ) -> Result<BTreeMap<String, Member<'a>>, AssemblyError> {
    let mut members = BTreeMap::new();

    let prefix = match plan.execution_mode {
      ExecutionMode::ZipApp => String::new(),
      ExecutionMode::Venv => format!("{VENV_LIB_DIR}/"),
    };
    for file in &plan.closure.files {
      let name = format!("{prefix}{}", file.archive_path);
      if name == MAIN_STUB || name.starts_with(&format!("{METADATA_DIR}/")) {
        return Err(AssemblyError::ReservedPath(file.path.clone()));
      }
      members.insert(
        name,
        Member {
          data: Cow::Borrowed(&file.content[..]),
          mode: FILE_MODE,
        },
      );
    }

    members.insert(
      LAUNCHER_RECORD.to_string(),
      Member {
        data: Cow::Owned(serde_json::to_vec_pretty(record)?),
        mode: FILE_MODE,
      },
    );
    members.insert(
      REQUIREMENTS_FILE.to_string(),
      Member {
        data: Cow::Owned(record.requirements_txt().into_bytes()),
        mode: FILE_MODE,
      },
    );

    let interactive = plan.entry_point == ResolvedEntryPoint::Interactive;
    if interactive {
      members.insert(
        INTERACTIVE_MARKER.to_string(),
        Member {
          data: Cow::Borrowed(&[]),
          mode: FILE_MODE,
        },
      );
    }

    // Without an entry point a zipapp has nothing to launch, so its
    // `__main__.py` only opens a console.
    let stub = match plan.execution_mode {
      ExecutionMode::ZipApp if interactive => INTERACTIVE_MAIN,
      ExecutionMode::ZipApp => ZIPAPP_MAIN,
      ExecutionMode::Venv => VENV_MAIN,
    };
    members.insert(
      MAIN_STUB.to_string(),
      Member {
        data: Cow::Borrowed(stub.as_bytes()),
        mode: STUB_MODE,
      },
    );

    Ok(members)
  }
}

fn write_zip(members: &BTreeMap<String, Member<'_>>) -> Result<Vec<u8>, AssemblyError> {
  let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
  for (name, member) in members {
    let options = SimpleFileOptions::default()
      .compression_method(CompressionMethod::Deflated)
      .last_modified_time(DateTime::default())
      .unix_permissions(member.mode);
    zip.start_file(name.as_str(), options)?;
    zip.write_all(&member.data)?;
  }
  Ok(zip.finish()?.into_inner())
}
