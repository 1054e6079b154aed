//! Output locations
//!
//! Every path the orchestrator reads or writes is derived here from the
//! project root, the configured output directories, the product, the version
//! and a sub-ID. Nothing is persisted: the staleness checks and the phase
//! executors recompute the same paths on demand.
//!
//! Layout:
//! - build: `{build_output_dir}/{product}/{version}/{os}-{arch}/{name}`
//! - dist:  `{dist_output_dir}/{product}/{version}/{dist_id}/{artifact}`

use std::path::{Path, PathBuf};

use crate::core::product::{DistId, DockerId, OsArch, Product, ProductId};

/// Replace `{{Key}}` placeholders in `template`
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in values {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

/// Path derivation for one project and version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    project_dir: PathBuf,
    version: String,
    build_output_dir: PathBuf,
    dist_output_dir: PathBuf,
}

impl Layout {
    /// Create a layout. Relative output directories are resolved against
    /// `project_dir`.
    pub fn new(
        project_dir: &Path,
        version: &str,
        build_output_dir: &Path,
        dist_output_dir: &Path,
    ) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            version: version.to_string(),
            build_output_dir: project_dir.join(build_output_dir),
            dist_output_dir: project_dir.join(dist_output_dir),
        }
    }

    /// Project root
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Project version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `{build_output_dir}/{product}/{version}`
    pub fn build_dir(&self, product: &ProductId) -> PathBuf {
        self.build_output_dir
            .join(product.as_str())
            .join(&self.version)
    }

    /// Rendered executable name, if the product has a build stage
    pub fn build_name(&self, product: &Product) -> Option<String> {
        product.build.as_ref().map(|build| {
            render_template(
                &build.name_template,
                &[("Product", product.id.as_str()), ("Version", &self.version)],
            )
        })
    }

    /// Build artifact path for one target
    pub fn build_artifact(&self, product: &Product, os_arch: &OsArch) -> Option<PathBuf> {
        let name = self.build_name(product)?;
        Some(
            self.build_dir(&product.id)
                .join(os_arch.to_string())
                .join(format!("{name}{}", os_arch.executable_suffix())),
        )
    }

    /// Build artifact paths for every declared target, in target order
    pub fn build_artifacts(&self, product: &Product) -> Vec<(OsArch, PathBuf)> {
        product
            .os_archs()
            .iter()
            .filter_map(|os_arch| {
                self.build_artifact(product, os_arch)
                    .map(|path| (os_arch.clone(), path))
            })
            .collect()
    }

    /// `{dist_output_dir}/{product}/{version}/{dist_id}`
    pub fn dist_dir(&self, product: &ProductId, dist_id: &DistId) -> PathBuf {
        self.dist_output_dir
            .join(product.as_str())
            .join(&self.version)
            .join(dist_id.as_str())
    }

    /// Rendered dist name, if the product declares `dist_id`
    pub fn dist_name(&self, product: &Product, dist_id: &DistId) -> Option<String> {
        let dister = product.dist.as_ref()?.disters.get(dist_id)?;
        Some(render_template(
            &dister.name_template,
            &[
                ("Product", product.id.as_str()),
                ("Version", &self.version),
                ("DistID", dist_id.as_str()),
            ],
        ))
    }

    /// Scratch directory the dist script assembles its output in
    pub fn dist_work_dir(&self, product: &Product, dist_id: &DistId) -> Option<PathBuf> {
        let name = self.dist_name(product, dist_id)?;
        Some(self.dist_dir(&product.id, dist_id).join(name))
    }

    /// Expected dist artifact paths for `dist_id` (empty if not declared)
    pub fn dist_artifacts(&self, product: &Product, dist_id: &DistId) -> Vec<PathBuf> {
        let Some(dister) = product.dist.as_ref().and_then(|d| d.disters.get(dist_id)) else {
            return Vec::new();
        };
        let Some(name) = self.dist_name(product, dist_id) else {
            return Vec::new();
        };
        let dir = self.dist_dir(&product.id, dist_id);
        dister
            .artifacts
            .iter()
            .map(|template| {
                dir.join(render_template(
                    template,
                    &[
                        ("Name", &name),
                        ("Product", product.id.as_str()),
                        ("Version", &self.version),
                        ("DistID", dist_id.as_str()),
                    ],
                ))
            })
            .collect()
    }

    /// Docker build context directory
    pub fn docker_context_dir(&self, product: &Product, docker_id: &DockerId) -> Option<PathBuf> {
        let builder = product.docker.as_ref()?.builders.get(docker_id)?;
        Some(self.project_dir.join(&builder.context_dir))
    }

    /// Rendered tags of a docker builder, in declaration order
    pub fn docker_tags(&self, product: &Product, docker_id: &DockerId) -> Vec<String> {
        let Some(builder) = product.docker.as_ref().and_then(|d| d.builders.get(docker_id)) else {
            return Vec::new();
        };
        let repository = builder.repository.as_deref().unwrap_or(product.id.as_str());
        builder
            .tags
            .iter()
            .map(|tag| {
                render_template(
                    &tag.template,
                    &[
                        ("Repository", repository),
                        ("Product", product.id.as_str()),
                        ("Version", &self.version),
                    ],
                )
            })
            .collect()
    }
}
