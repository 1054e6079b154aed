//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a project with `manifest` as its prodctl.toml, backdated so
    /// that outputs written by the test are newer than the configuration
    pub fn with_manifest(manifest: &str) -> Self {
        let project = Self::new();
        project.write_manifest(manifest);
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write prodctl.toml and set its mtime one hour in the past
    pub fn write_manifest(&self, content: &str) {
        self.create_file("prodctl.toml", content);
        self.set_mtime("prodctl.toml", SystemTime::now() - Duration::from_secs(3600));
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Set the modification time of a file in the test project
    pub fn set_mtime(&self, name: &str, time: SystemTime) {
        set_mtime(&self.dir.path().join(name), time);
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Read a file, or an empty string if it does not exist
    pub fn read_file_or_empty(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).unwrap_or_default()
    }

    /// Run prodctl in the project directory
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_prodctl"))
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .env_remove("PRODCTL_PROJECT_DIR")
            .args(args)
            .output()
            .expect("Failed to execute prodctl")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Set the modification time of `path`
pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .expect("Failed to open file");
    file.set_modified(time).expect("Failed to set mtime");
}

/// Standard output as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Standard error as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Build output path of a single-target product at version 1.0.0
pub fn build_artifact(product: &str, os_arch: &str) -> String {
    format!("out/build/{product}/1.0.0/{os_arch}/{product}")
}

/// Dist artifact path of a product's dist `d` at version 1.0.0
pub fn dist_artifact(product: &str) -> String {
    format!("out/dist/{product}/1.0.0/d/{product}-1.0.0.tgz")
}

/// foo depends on bar; both build for linux-amd64 and declare dist `d`.
/// Every script appends a line to `runs.log`; foo's dist artifact records
/// the dependency variables it received.
pub const FOO_BAR_MANIFEST: &str = r#"
[project]
version = "1.0.0"

[products.foo]
dependencies = ["bar"]

[products.foo.build]
os_archs = ["linux-amd64"]
script = 'echo "build $PRODUCT $BUILD_OS-$BUILD_ARCH" >> "$PROJECT_DIR/runs.log"; echo foo > "$BUILD_OUTPUT"'

[products.foo.dist.d]
script = 'echo "dist $PRODUCT" >> "$PROJECT_DIR/runs.log"; echo "$DEP_PRODUCT_ID_COUNT $DEP_PRODUCT_ID_0 $DEP_PRODUCT_ID_0_DIST_NAME" > "$DIST_DIR/$DIST_NAME.tgz"'

[products.bar.build]
os_archs = ["linux-amd64"]
script = 'echo "build $PRODUCT $BUILD_OS-$BUILD_ARCH" >> "$PROJECT_DIR/runs.log"; echo bar > "$BUILD_OUTPUT"'

[products.bar.dist.d]
script = 'echo "dist $PRODUCT" >> "$PROJECT_DIR/runs.log"; echo bar > "$DIST_DIR/$DIST_NAME.tgz"'
"#;
