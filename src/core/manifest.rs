//! Manifest (prodctl.toml) parsing
//!
//! The manifest declares the project version, the output directories and
//! every product with its stages and dependencies.
//! Supports environment variable substitution using ${VAR} syntax.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::product::{
    BuildSpec, DistSpec, DockerSpec, OsArch, Product, ProductId, PublishSpec,
};
use crate::error::ManifestError;

/// The project manifest (prodctl.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Project configuration
    #[serde(default)]
    pub project: ProjectConfig,

    /// Product definitions keyed by product ID
    #[serde(default)]
    pub products: BTreeMap<ProductId, ProductConfig>,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project version, substituted into every output path
    #[serde(default = "default_version")]
    pub version: String,

    /// Root of build outputs, relative to the project directory
    #[serde(default = "default_build_output_dir")]
    pub build_output_dir: PathBuf,

    /// Root of dist outputs, relative to the project directory
    #[serde(default = "default_dist_output_dir")]
    pub dist_output_dir: PathBuf,
}

fn default_version() -> String {
    defaults::DEFAULT_VERSION.to_string()
}

fn default_build_output_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_BUILD_OUTPUT_DIR)
}

fn default_dist_output_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DIST_OUTPUT_DIR)
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            build_output_dir: default_build_output_dir(),
            dist_output_dir: default_dist_output_dir(),
        }
    }
}

/// One product as written in the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductConfig {
    /// First-level dependencies
    #[serde(default)]
    pub dependencies: Vec<ProductId>,

    /// Build stage
    #[serde(default)]
    pub build: Option<BuildSpec>,

    /// Dist stage
    #[serde(default)]
    pub dist: Option<DistSpec>,

    /// Publish stage
    #[serde(default)]
    pub publish: Option<PublishSpec>,

    /// Docker stage
    #[serde(default)]
    pub docker: Option<DockerSpec>,
}

/// Substitute environment variables in a string.
///
/// Replaces `${VAR}` patterns with the value of the environment variable.
/// If the variable is not set, it's replaced with an empty string.
///
/// # Examples
/// ```
/// use prodctl::core::manifest::substitute_env_vars;
///
/// std::env::set_var("PRODCTL_DOC_VAR", "hello");
/// let result = substitute_env_vars("prefix_${PRODCTL_DOC_VAR}_suffix").unwrap();
/// assert_eq!(result, "prefix_hello_suffix");
/// std::env::remove_var("PRODCTL_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, String> {
    let re =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| format!("Invalid regex: {e}"))?;

    let mut last_end = 0;
    let mut output = String::new();

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        output.push_str(&input[last_end..full_match.start()]);
        output.push_str(&std::env::var(&cap[1]).unwrap_or_default());
        last_end = full_match.end();
    }

    output.push_str(&input[last_end..]);
    Ok(output)
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) -> Result<(), String> {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        toml::Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_in_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

impl Manifest {
    /// Load manifest from file path, substituting `${VAR}` references in
    /// every string value
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut value: toml::Value =
            toml::from_str(&content).map_err(|source| ManifestError::Parse { source })?;
        substitute_in_value(&mut value).map_err(ManifestError::Invalid)?;

        let manifest: Self = value
            .try_into()
            .map_err(|source| ManifestError::Parse { source })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load manifest from TOML string, without substitution
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self =
            toml::from_str(content).map_err(|source| ManifestError::Parse { source })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize manifest to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject values that parse but cannot be used
    fn validate(&self) -> Result<(), ManifestError> {
        if self.project.version.is_empty() {
            return Err(ManifestError::Invalid("project.version must not be empty".to_string()));
        }
        for (id, product) in &self.products {
            if id.as_str().is_empty() || id.as_str().contains('.') {
                return Err(ManifestError::Invalid(format!(
                    "product ID '{id}' must be non-empty and must not contain '.'"
                )));
            }
            if let Some(dist) = &product.dist {
                for (dist_id, dister) in &dist.disters {
                    if dist_id.as_str().contains('.') {
                        return Err(ManifestError::Invalid(format!(
                            "dist ID '{dist_id}' of '{id}' must not contain '.'"
                        )));
                    }
                    if dister.artifacts.is_empty() {
                        return Err(ManifestError::Invalid(format!(
                            "dist '{id}.{dist_id}' must declare at least one artifact"
                        )));
                    }
                }
            }
            if let Some(docker) = &product.docker {
                for (docker_id, builder) in &docker.builders {
                    if docker_id.as_str().contains('.') {
                        return Err(ManifestError::Invalid(format!(
                            "docker ID '{docker_id}' of '{id}' must not contain '.'"
                        )));
                    }
                    let mut seen = BTreeSet::new();
                    for tag in &builder.tags {
                        if tag.id.as_str().contains('.') || !seen.insert(&tag.id) {
                            return Err(ManifestError::Invalid(format!(
                                "tag ID '{}' of '{id}.{docker_id}' must be unique and must not contain '.'",
                                tag.id
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Convert the manifest into immutable products.
    ///
    /// Build targets are deduplicated and sorted so every later step sees
    /// them in canonical order. A build without targets compiles for the
    /// host.
    pub fn products(&self) -> BTreeMap<ProductId, Product> {
        self.products
            .iter()
            .map(|(id, config)| {
                let build = config.build.clone().map(|mut build| {
                    let unique: BTreeSet<OsArch> = build.os_archs.into_iter().collect();
                    build.os_archs = if unique.is_empty() {
                        vec![OsArch::host()]
                    } else {
                        unique.into_iter().collect()
                    };
                    build
                });
                let product = Product {
                    id: id.clone(),
                    build,
                    dist: config.dist.clone(),
                    publish: config.publish.clone(),
                    docker: config.docker.clone(),
                    dependencies: config.dependencies.clone(),
                };
                (id.clone(), product)
            })
            .collect()
    }
}
