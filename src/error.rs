//! Error types for prodctl
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::product::Phase;

/// Manifest loading errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("Manifest not found at '{path}'")]
    NotFound { path: PathBuf },

    /// Manifest could not be read
    #[error("Failed to read manifest '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid TOML for the expected schema
    #[error("Failed to parse manifest")]
    Parse {
        #[source]
        source: toml::de::Error,
    },

    /// Manifest parsed but contains invalid values
    #[error("Invalid manifest: {0}")]
    Invalid(String),

    /// Product graph in the manifest is inconsistent
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Selector resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// One or more selectors do not name a known product or sub-element.
    /// Every invalid selector is reported at once.
    #[error(
        "Invalid {kind} selector(s): [{}]. Valid values: [{}]",
        invalid.join(", "),
        valid.join(", ")
    )]
    Invalid {
        kind: String,
        invalid: Vec<String>,
        valid: Vec<String>,
    },
}

/// Dependency graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A product references a dependency that is not in the working set
    #[error("Missing dependency: '{dependency}' required by '{product}'")]
    MissingDependency { product: String, dependency: String },

    /// Topological ordering could not consume every node
    #[error("Circular dependency detected among: {}", products.join(", "))]
    Cycle { products: Vec<String> },
}

/// Staleness check errors
#[derive(Error, Debug)]
pub enum StalenessError {
    /// Stat failed for a reason other than the file not existing
    #[error("Failed to read modification time of '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source enumeration failed
    #[error("Failed to enumerate sources for '{product}': {error}")]
    Sources { product: String, error: String },
}

/// Errors raised by stage executors
#[derive(Error, Debug)]
pub enum ExecError {
    /// Process could not be started
    #[error("Failed to start '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Process exited unsuccessfully
    #[error("Script exited with {status}\n{output}")]
    Failed { status: String, output: String },

    /// Script finished but a declared output is absent
    #[error("Expected artifact '{path}' was not produced")]
    MissingArtifact { path: PathBuf },

    /// Filesystem preparation failed
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Work was aborted through the cancellation token
    #[error("Cancelled")]
    Cancelled,
}

/// Errors aborting an orchestrated run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Selector resolution failed
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Graph integrity or cycle error
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Staleness check failed
    #[error(transparent)]
    Staleness(#[from] StalenessError),

    /// A stage executor failed for a product
    #[error("{phase} failed for product '{product}'")]
    Exec {
        product: String,
        phase: Phase,
        #[source]
        source: ExecError,
    },

    /// A build worker task panicked or was aborted by the runtime
    #[error("Build worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Wrap an executor error with the owning product and phase
    pub fn exec(product: impl Into<String>, phase: Phase, source: ExecError) -> Self {
        Self::Exec {
            product: product.into(),
            phase,
            source,
        }
    }
}
