use super::os::Os;

/// CPU architectures pakt can detect on the build host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      _ => None,
    }
  }

  /// Spelling of this architecture in platform tags for `os`.
  ///
  /// Wheel tags are not uniform: macOS says `arm64` and Windows says `amd64`.
  pub fn tag_name(&self, os: Os) -> &'static str {
    match (self, os) {
      (Self::X86_64, Os::Windows) => "amd64",
      (Self::X86_64, _) => "x86_64",
      (Self::Aarch64, Os::MacOs | Os::Windows) => "arm64",
      (Self::Aarch64, Os::Linux) => "aarch64",
    }
  }
}
