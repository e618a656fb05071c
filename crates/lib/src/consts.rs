pub const APP_NAME: &str = "pakt";

/// Environment variable overriding the artifact store directory.
pub const STORE_ENV: &str = "PAKT_STORE";

/// Environment variable overriding host platform detection.
pub const HOST_PLATFORM_ENV: &str = "PAKT_HOST_PLATFORM";

/// Version of the fingerprint input layout. Bump when the hashed fields change.
pub const FINGERPRINT_FORMAT: u32 = 1;

/// Version of the embedded launcher record.
pub const LAUNCHER_FORMAT: u32 = 1;

/// Completion marker written next to a stored artifact.
pub const ARTIFACT_COMPLETE_MARKER: &str = ".pakt-complete";

/// File name of the artifact bytes inside a store entry.
pub const ARTIFACT_FILE: &str = "artifact.bin";

/// Version of the store completion marker format.
pub const ARTIFACT_MARKER_VERSION: u32 = 1;

/// Reserved archive directory for engine metadata.
pub const METADATA_DIR: &str = "__pakt__";

/// Launcher record path inside an artifact.
pub const LAUNCHER_RECORD: &str = "__pakt__/launcher.json";

/// Requirement pin list inside an artifact.
pub const REQUIREMENTS_FILE: &str = "__pakt__/requirements.txt";

/// Marker written instead of a launcher when the artifact has no entry point.
pub const INTERACTIVE_MARKER: &str = "__pakt__/INTERACTIVE";

/// Archive path of the launcher or bootstrap stub.
pub const MAIN_STUB: &str = "__main__.py";

/// Directory holding first-party sources in venv-mode artifacts.
pub const VENV_LIB_DIR: &str = "lib";

/// Extensions recognised as importable first-party source files.
pub const SOURCE_FILE_EXTENSIONS: &[&str] = &[".py"];

/// Default launcher interpreter.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Extension of produced artifacts.
pub const ARTIFACT_EXTENSION: &str = "pex";

/// Length of the abbreviated fingerprint used in logs and file listings.
pub const SHORT_FINGERPRINT_LEN: usize = 12;

/// Project file looked up when a directory is given.
pub const PROJECT_FILE: &str = "pakt.json";
