//! Default configuration values

/// Manifest file name, looked up in the project directory
pub const MANIFEST_FILE: &str = "prodctl.toml";

/// Version used when the manifest does not declare one
pub const DEFAULT_VERSION: &str = "0.0.0-unspecified";

/// Build output root, relative to the project directory
pub const DEFAULT_BUILD_OUTPUT_DIR: &str = "out/build";

/// Dist output root, relative to the project directory
pub const DEFAULT_DIST_OUTPUT_DIR: &str = "out/dist";

/// Shell used to interpret stage scripts
pub const DEFAULT_SHELL: &str = "sh";

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
