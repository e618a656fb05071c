pub mod arch;
pub mod os;
pub mod paths;
mod resolve;

use arch::Arch;
use os::Os;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use resolve::{PlatformError, PlatformResolver, ResolvedPlatforms};

/// Platform identifier combining OS and architecture (e.g., "linux-x86_64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Returns the platform tag for this platform (e.g., "macosx-arm64")
  pub fn tag(&self) -> PlatformTag {
    PlatformTag(format!("{}-{}", self.os, self.arch.tag_name(self.os)))
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.tag())
  }
}

/// Opaque platform tag naming a build target platform.
///
/// Tags compare as strings. Host tags have the form `<os>-<arch>`, but any
/// non-blank tag without whitespace is accepted so lock files can name
/// platforms this machine cannot detect.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformTag(String);

impl PlatformTag {
  pub fn new(tag: impl Into<String>) -> Self {
    Self(tag.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The tag of the machine running this process, if detectable.
  pub fn host() -> Option<Self> {
    Platform::current().map(|p| p.tag())
  }
}

impl fmt::Display for PlatformTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for PlatformTag {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let tag = s.trim();
    if tag.is_empty() || tag.chars().any(char::is_whitespace) {
      return Err(PlatformError::InvalidTag(s.to_string()));
    }
    Ok(Self(tag.to_string()))
  }
}

impl TryFrom<String> for PlatformTag {
  type Error = PlatformError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<PlatformTag> for String {
  fn from(value: PlatformTag) -> Self {
    value.0
  }
}
