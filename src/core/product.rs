//! Product definitions
//!
//! A product is a named buildable unit with optional build, dist, publish and
//! docker stages plus declared dependencies on other products. Products are
//! immutable once loaded; narrowing a product to a subset of its targets,
//! dists or images always produces a new value.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a product, unique within a project
    ProductId
);
string_id!(
    /// Identifier of a dist output, unique within its product
    DistId
);
string_id!(
    /// Identifier of a docker image builder, unique within its product
    DockerId
);
string_id!(
    /// Identifier of a docker tag, unique within its image builder
    TagId
);

/// Pipeline phases, always executed in this relative order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Compile executables
    Build,
    /// Package build outputs
    Dist,
    /// Build container images
    Docker,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Dist => write!(f, "dist"),
            Self::Docker => write!(f, "docker"),
        }
    }
}

/// Error parsing an OS/Arch pair
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid OS/Arch '{0}': expected '<os>-<arch>'")]
pub struct OsArchParseError(pub String);

/// A compilation target such as `linux-amd64`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OsArch {
    /// Operating system (e.g., "linux")
    pub os: String,
    /// Architecture (e.g., "amd64")
    pub arch: String,
}

impl OsArch {
    /// Create a target from its parts
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// The target this binary runs on, spelled the way manifests spell
    /// targets (`darwin`, `amd64`, `arm64`)
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            "powerpc64" => "ppc64",
            other => other,
        };
        Self::new(os, arch)
    }

    /// Executable suffix for this target
    pub fn executable_suffix(&self) -> &'static str {
        if self.os == "windows" {
            ".exe"
        } else {
            ""
        }
    }
}

impl fmt::Display for OsArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for OsArch {
    type Err = OsArchParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() => Ok(Self::new(os, arch)),
            _ => Err(OsArchParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for OsArch {
    type Error = OsArchParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OsArch> for String {
    fn from(value: OsArch) -> Self {
        value.to_string()
    }
}

fn default_name_template() -> String {
    "{{Product}}".to_string()
}

fn default_dist_name_template() -> String {
    "{{Product}}-{{Version}}".to_string()
}

fn default_dist_artifacts() -> Vec<String> {
    vec!["{{Name}}.tgz".to_string()]
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

/// Build stage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Directory (relative to the project) whose files are the build inputs
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Executable name template
    #[serde(default = "default_name_template")]
    pub name_template: String,

    /// Targets to compile for. Left empty, the product builds for the host.
    #[serde(default)]
    pub os_archs: Vec<OsArch>,

    /// Shell script that produces `$BUILD_OUTPUT`
    pub script: String,

    /// Extra environment for the script
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A single dist output of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisterSpec {
    /// Dist name template
    #[serde(default = "default_dist_name_template")]
    pub name_template: String,

    /// Artifact file templates, relative to the dist output directory
    #[serde(default = "default_dist_artifacts")]
    pub artifacts: Vec<String>,

    /// Shell script that produces the artifacts
    pub script: String,

    /// Extra environment for the script
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Dist stage configuration, keyed by dist ID
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistSpec {
    /// Declared dist outputs
    pub disters: BTreeMap<DistId, DisterSpec>,
}

/// Publish stage configuration. Publishing itself is handled outside this
/// tool; the declaration is kept so products report their stages faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublishSpec {
    /// Group identifier used by repository publishers
    #[serde(default)]
    pub group_id: Option<String>,

    /// Publisher-specific properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A docker tag template; declaration order is significant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTemplate {
    /// Tag identifier
    pub id: TagId,
    /// Tag template (e.g., "{{Repository}}:{{Version}}")
    pub template: String,
}

/// A single docker image builder of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerBuilderSpec {
    /// Build context directory, relative to the project
    pub context_dir: PathBuf,

    /// Dockerfile path, relative to the context directory
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    /// Image repository substituted for `{{Repository}}`
    #[serde(default)]
    pub repository: Option<String>,

    /// Tag templates in declaration order
    #[serde(default)]
    pub tags: Vec<TagTemplate>,

    /// Script replacing the default `docker build` invocation
    #[serde(default)]
    pub script: Option<String>,

    /// Extra environment for the script
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Docker stage configuration, keyed by docker ID
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DockerSpec {
    /// Declared image builders
    pub builders: BTreeMap<DockerId, DockerBuilderSpec>,
}

/// A buildable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Product identifier
    pub id: ProductId,
    /// Build stage, if declared
    pub build: Option<BuildSpec>,
    /// Dist stage, if declared
    pub dist: Option<DistSpec>,
    /// Publish stage, if declared
    pub publish: Option<PublishSpec>,
    /// Docker stage, if declared
    pub docker: Option<DockerSpec>,
    /// First-level dependencies
    pub dependencies: Vec<ProductId>,
}

impl Product {
    /// Create a product with no stages and no dependencies
    pub fn new(id: impl Into<ProductId>) -> Self {
        Self {
            id: id.into(),
            build: None,
            dist: None,
            publish: None,
            docker: None,
            dependencies: Vec::new(),
        }
    }

    /// Whether the stage executed by `phase` is declared
    pub fn declares(&self, phase: Phase) -> bool {
        match phase {
            Phase::Build => self.build.is_some(),
            Phase::Dist => self.dist.is_some(),
            Phase::Docker => self.docker.is_some(),
        }
    }

    /// Names of the declared stages, in pipeline order
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut stages = Vec::new();
        if self.build.is_some() {
            stages.push("build");
        }
        if self.dist.is_some() {
            stages.push("dist");
        }
        if self.publish.is_some() {
            stages.push("publish");
        }
        if self.docker.is_some() {
            stages.push("docker");
        }
        stages
    }

    /// Declared OS/Arch targets (empty when no build stage)
    pub fn os_archs(&self) -> &[OsArch] {
        self.build.as_ref().map_or(&[], |b| b.os_archs.as_slice())
    }

    /// Declared dist IDs in canonical order
    pub fn dist_ids(&self) -> Vec<DistId> {
        self.dist
            .as_ref()
            .map(|d| d.disters.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Declared docker IDs in canonical order
    pub fn docker_ids(&self) -> Vec<DockerId> {
        self.docker
            .as_ref()
            .map(|d| d.builders.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of this product whose build targets are replaced by `os_archs`
    #[must_use]
    pub fn with_os_archs(&self, os_archs: Vec<OsArch>) -> Self {
        let mut narrowed = self.clone();
        if let Some(build) = narrowed.build.as_mut() {
            build.os_archs = os_archs;
        }
        narrowed
    }

    /// Copy of this product keeping only the listed dists
    #[must_use]
    pub fn with_dist_ids(&self, keep: &BTreeSet<DistId>) -> Self {
        let mut narrowed = self.clone();
        if let Some(dist) = narrowed.dist.as_mut() {
            dist.disters.retain(|id, _| keep.contains(id));
        }
        narrowed
    }

    /// Copy of this product keeping only the listed images, each narrowed to
    /// the listed tags. Tag declaration order is preserved.
    #[must_use]
    pub fn with_docker_selection(&self, keep: &BTreeMap<DockerId, BTreeSet<TagId>>) -> Self {
        let mut narrowed = self.clone();
        if let Some(docker) = narrowed.docker.as_mut() {
            docker.builders.retain(|id, _| keep.contains_key(id));
            for (id, builder) in &mut docker.builders {
                if let Some(tags) = keep.get(id) {
                    builder.tags.retain(|tag| tags.contains(&tag.id));
                }
            }
        }
        narrowed
    }
}

/// A product narrowed to the selected sub-elements, together with the full
/// definitions of every product it transitively depends on. Work items are
/// owned copies: nothing here aliases the loaded product set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// The (possibly narrowed) product
    pub product: Product,
    /// Transitive dependencies, keyed by ID
    pub all_dependencies: BTreeMap<ProductId, Product>,
}

impl WorkItem {
    /// Product ID of this item
    pub fn id(&self) -> &ProductId {
        &self.product.id
    }

    /// Same item with the product replaced by a narrowed copy
    #[must_use]
    pub fn narrowed(&self, product: Product) -> Self {
        Self {
            product,
            all_dependencies: self.all_dependencies.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Product with a build stage for the given targets
    pub fn with_build(id: &str, os_archs: &[&str]) -> Product {
        let mut product = Product::new(id);
        product.build = Some(BuildSpec {
            source_dir: None,
            name_template: default_name_template(),
            os_archs: os_archs.iter().map(|s| s.parse().unwrap()).collect(),
            script: "true".to_string(),
            env: BTreeMap::new(),
        });
        product
    }

    /// Add dist outputs to a product
    pub fn add_dists(mut product: Product, ids: &[&str]) -> Product {
        let mut dist = DistSpec::default();
        for id in ids {
            dist.disters.insert(
                DistId::from(*id),
                DisterSpec {
                    name_template: default_dist_name_template(),
                    artifacts: default_dist_artifacts(),
                    script: "true".to_string(),
                    env: BTreeMap::new(),
                },
            );
        }
        product.dist = Some(dist);
        product
    }

    /// Add docker builders with tags (in the given order) to a product
    pub fn add_docker(mut product: Product, images: &[(&str, &[&str])]) -> Product {
        let mut docker = DockerSpec::default();
        for (id, tags) in images {
            docker.builders.insert(
                DockerId::from(*id),
                DockerBuilderSpec {
                    context_dir: PathBuf::from(format!("docker/{id}")),
                    dockerfile: default_dockerfile(),
                    repository: Some(format!("example/{}", product.id)),
                    tags: tags
                        .iter()
                        .map(|t| TagTemplate {
                            id: TagId::from(*t),
                            template: format!("{{{{Repository}}}}:{t}"),
                        })
                        .collect(),
                    script: None,
                    env: BTreeMap::new(),
                },
            );
        }
        product.docker = Some(docker);
        product
    }

    /// Declare first-level dependencies
    pub fn depends_on(mut product: Product, deps: &[&str]) -> Product {
        product.dependencies = deps.iter().map(|d| ProductId::from(*d)).collect();
        product
    }

    /// Index products by ID
    pub fn product_map(products: Vec<Product>) -> BTreeMap<ProductId, Product> {
        products.into_iter().map(|p| (p.id.clone(), p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_os_arch_parse_and_display() {
        let target: OsArch = "linux-amd64".parse().unwrap();
        assert_eq!(target.os, "linux");
        assert_eq!(target.arch, "amd64");
        assert_eq!(target.to_string(), "linux-amd64");
    }

    #[test]
    fn test_os_arch_keeps_dashes_in_arch() {
        let target: OsArch = "linux-arm-v7".parse().unwrap();
        assert_eq!(target.os, "linux");
        assert_eq!(target.arch, "arm-v7");
    }

    #[test]
    fn test_os_arch_rejects_malformed() {
        assert!("linux".parse::<OsArch>().is_err());
        assert!("-amd64".parse::<OsArch>().is_err());
        assert!("linux-".parse::<OsArch>().is_err());
    }

    #[test]
    fn test_host_uses_manifest_spelling() {
        let host = OsArch::host();
        assert!(!host.os.is_empty());
        assert_ne!(host.os, "macos");
        assert_ne!(host.arch, "x86_64");
        assert_ne!(host.arch, "aarch64");
        assert_eq!(host.to_string().parse::<OsArch>().unwrap(), host);
    }

    #[test]
    fn test_windows_suffix() {
        assert_eq!(OsArch::new("windows", "amd64").executable_suffix(), ".exe");
        assert_eq!(OsArch::new("linux", "amd64").executable_suffix(), "");
    }

    #[test]
    fn test_missing_stage_is_not_declared() {
        let product = with_build("foo", &["linux-amd64"]);
        assert!(product.declares(Phase::Build));
        assert!(!product.declares(Phase::Dist));
        assert!(!product.declares(Phase::Docker));
        assert_eq!(product.stage_names(), vec!["build"]);
    }

    #[test]
    fn test_narrowing_does_not_mutate_original() {
        let original = add_dists(with_build("foo", &["linux-amd64"]), &["a", "b"]);
        let keep: BTreeSet<DistId> = [DistId::from("b")].into_iter().collect();

        let narrowed = original.with_dist_ids(&keep);

        assert_eq!(narrowed.dist_ids(), vec![DistId::from("b")]);
        assert_eq!(original.dist_ids(), vec![DistId::from("a"), DistId::from("b")]);
    }

    #[test]
    fn test_docker_narrowing_preserves_tag_order() {
        let original = add_docker(Product::new("foo"), &[("img", &["zeta", "alpha", "mid"])]);
        let mut keep = BTreeMap::new();
        keep.insert(
            DockerId::from("img"),
            [TagId::from("zeta"), TagId::from("mid")].into_iter().collect(),
        );

        let narrowed = original.with_docker_selection(&keep);
        let tags: Vec<&str> = narrowed.docker.as_ref().unwrap().builders[&DockerId::from("img")]
            .tags
            .iter()
            .map(|t| t.id.as_str())
            .collect();

        assert_eq!(tags, vec!["zeta", "mid"]);
    }

    #[test]
    fn test_ids_borrow_as_str() {
        let map = product_map(vec![Product::new("foo")]);
        assert!(map.contains_key("foo"));
    }
}
