use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::PlatformTag;
use crate::closure::DependencyClosure;
use crate::constraint::Version;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
  #[error(
    "requirement {requirement}=={version} has no prebuilt artifact for platform {platform} (available: {})",
    render_tags(.available)
  )]
  UnsupportedPlatform {
    requirement: String,
    version: Version,
    platform: PlatformTag,
    available: Vec<PlatformTag>,
  },

  #[error("cannot detect the host platform; set PAKT_HOST_PLATFORM")]
  UnknownHost,

  #[error("invalid platform tag '{0}'")]
  InvalidTag(String),
}

fn render_tags(tags: &[PlatformTag]) -> String {
  if tags.is_empty() {
    return "none".to_string();
  }
  tags.iter().map(PlatformTag::as_str).collect::<Vec<_>>().join(", ")
}

/// Platforms an artifact is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPlatforms {
  pub tags: BTreeSet<PlatformTag>,
  pub host: PlatformTag,
}

impl ResolvedPlatforms {
  /// True when any tag differs from the build host.
  pub fn is_cross_build(&self) -> bool {
    self.tags.iter().any(|tag| tag != &self.host)
  }
}

/// Decides which platform tags a closure can be built for.
#[derive(Debug, Clone)]
pub struct PlatformResolver {
  host: PlatformTag,
}

impl PlatformResolver {
  pub fn new(host: PlatformTag) -> Self {
    Self { host }
  }

  pub fn host(&self) -> &PlatformTag {
    &self.host
  }

  /// Resolve the requested tags against the closure's native requirements.
  ///
  /// An empty request means the build host, where native requirements are
  /// built locally. Otherwise every native requirement needs a prebuilt
  /// artifact for every requested tag.
  pub fn resolve(
    &self,
    requested: &[PlatformTag],
    closure: &DependencyClosure,
  ) -> Result<ResolvedPlatforms, PlatformError> {
    if requested.is_empty() {
      return Ok(ResolvedPlatforms {
        tags: BTreeSet::from([self.host.clone()]),
        host: self.host.clone(),
      });
    }

    let tags: BTreeSet<PlatformTag> = requested.iter().cloned().collect();
    for requirement in &closure.requirements {
      let resolved = &requirement.resolved;
      if !resolved.native {
        continue;
      }
      if let Some(missing) = tags.iter().find(|tag| !resolved.has_prebuilt(tag)) {
        return Err(PlatformError::UnsupportedPlatform {
          requirement: requirement.name.clone(),
          version: resolved.version.clone(),
          platform: missing.clone(),
          available: resolved.platforms.iter().cloned().collect(),
        });
      }
    }

    debug!(platforms = ?tags, host = %self.host, "resolved target platforms");
    Ok(ResolvedPlatforms {
      tags,
      host: self.host.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::closure::ClosureRequirement;
  use crate::requirement::ResolvedRequirement;
  use crate::target::Address;

  fn closure_with(requirements: Vec<ResolvedRequirement>) -> DependencyClosure {
    let root = Address::new("app", "app");
    DependencyClosure {
      root: root.clone(),
      targets: vec![root],
      files: Vec::new(),
      requirements: requirements
        .into_iter()
        .map(|resolved| ClosureRequirement {
          name: resolved.canonical_name(),
          constraint: Default::default(),
          contributions: Vec::new(),
          resolved,
        })
        .collect(),
    }
  }

  fn tag(s: &str) -> PlatformTag {
    PlatformTag::new(s)
  }

  #[test]
  fn empty_request_is_the_host() {
    let resolver = PlatformResolver::new(tag("linux-x86_64"));
    let native = ResolvedRequirement::native("numpy", "1.26".parse().unwrap(), []);
    let resolved = resolver.resolve(&[], &closure_with(vec![native])).unwrap();
    assert_eq!(resolved.tags, BTreeSet::from([tag("linux-x86_64")]));
    assert!(!resolved.is_cross_build());
  }

  #[test]
  fn cross_build_needs_prebuilt_native_artifacts() {
    let resolver = PlatformResolver::new(tag("linux-x86_64"));
    let native = ResolvedRequirement::native("numpy", "1.26".parse().unwrap(), [tag("macosx-aarch64")]);
    let err = resolver
      .resolve(&[tag("linux-x86_64")], &closure_with(vec![native]))
      .unwrap_err();

    match &err {
      PlatformError::UnsupportedPlatform {
        requirement, platform, ..
      } => {
        assert_eq!(requirement, "numpy");
        assert_eq!(platform, &tag("linux-x86_64"));
      }
      other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("available: macosx-aarch64"));
  }

  #[test]
  fn pure_requirements_do_not_constrain_platforms() {
    let resolver = PlatformResolver::new(tag("linux-x86_64"));
    let pure = ResolvedRequirement::pure("r", "1.0".parse().unwrap());
    let resolved = resolver
      .resolve(&[tag("macosx-aarch64"), tag("linux-aarch64")], &closure_with(vec![pure]))
      .unwrap();
    assert_eq!(resolved.tags.len(), 2);
    assert!(resolved.is_cross_build());
  }
}
