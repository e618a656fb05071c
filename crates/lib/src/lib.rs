//! pakt-lib: packaging engine for pakt
//!
//! This crate turns a build target into a deployable, self-contained
//! artifact:
//! - `closure`: the transitive first-party files and locked requirements a target needs
//! - `entry_point`, `platform`, `constraint`: invocation, platform and runtime metadata
//!   reconciled across the closure
//! - `fingerprint`: a content hash of the resolved plan
//! - `cache` and `assemble`: deterministic, single-flight artifact builds
//! - `package`: the control flow tying it together

pub mod artifact;
pub mod assemble;
pub mod cache;
pub mod closure;
pub mod config;
pub mod constraint;
pub mod consts;
pub mod entry_point;
pub mod fingerprint;
pub mod package;
pub mod platform;
pub mod project;
pub mod requirement;
pub mod target;
pub mod util;
