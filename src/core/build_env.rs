//! Script environment setup
//!
//! Build, dist and docker scripts learn everything about the work they are
//! asked to do through environment variables. Every script receives
//! `PROJECT_DIR`, `VERSION` and `PRODUCT`; each phase adds its own family.
//!
//! Dist scripts additionally receive a `DEP_PRODUCT_ID_<n>_*` family, one
//! index per transitive dependency in ID order, so packaging scripts can find
//! dependency outputs without knowing the output layout.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::layout::Layout;
use crate::core::product::{DistId, DockerId, OsArch, Product, WorkItem};

/// Separator for list-valued path variables
pub const PATH_LIST_SEPARATOR: &str = ":";

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

fn join_paths(paths: &[std::path::PathBuf]) -> String {
    paths
        .iter()
        .map(|p| path_string(p))
        .collect::<Vec<_>>()
        .join(PATH_LIST_SEPARATOR)
}

/// Environment variables for one script invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptEnvironment {
    vars: BTreeMap<String, String>,
}

impl ScriptEnvironment {
    /// Variables shared by every phase
    pub fn base(layout: &Layout, product: &Product) -> Self {
        Self::default()
            .with_env("PROJECT_DIR", &path_string(layout.project_dir()))
            .with_env("VERSION", layout.version())
            .with_env("PRODUCT", product.id.as_str())
    }

    /// Environment for compiling `product` for `os_arch`
    pub fn for_build(layout: &Layout, product: &Product, os_arch: &OsArch) -> Self {
        let mut env = Self::base(layout, product)
            .with_env("BUILD_OS", &os_arch.os)
            .with_env("BUILD_ARCH", &os_arch.arch)
            .with_env("BUILD_DIR", &path_string(&layout.build_dir(&product.id)));
        if let Some(name) = layout.build_name(product) {
            env = env.with_env("BUILD_NAME", &name);
        }
        if let Some(output) = layout.build_artifact(product, os_arch) {
            env = env.with_env("BUILD_OUTPUT", &path_string(&output));
        }
        if let Some(build) = &product.build {
            env = env.with_user_env(&build.env);
        }
        env
    }

    /// Environment for producing `dist_id` of the item's product
    pub fn for_dist(layout: &Layout, item: &WorkItem, dist_id: &DistId) -> Self {
        let product = &item.product;
        let mut env = Self::base(layout, product)
            .with_env("DIST_ID", dist_id.as_str())
            .with_env("DIST_DIR", &path_string(&layout.dist_dir(&product.id, dist_id)))
            .with_env("BUILD_DIR", &path_string(&layout.build_dir(&product.id)))
            .with_env(
                "DIST_ARTIFACTS",
                &join_paths(&layout.dist_artifacts(product, dist_id)),
            )
            .with_env(
                "BUILD_OS_ARCHS",
                &product
                    .os_archs()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        if let Some(name) = layout.dist_name(product, dist_id) {
            env = env.with_env("DIST_NAME", &name);
        }
        if let Some(work_dir) = layout.dist_work_dir(product, dist_id) {
            env = env.with_env("DIST_WORK_DIR", &path_string(&work_dir));
        }
        if let Some(name) = layout.build_name(product) {
            env = env.with_env("BUILD_NAME", &name);
        }

        env = env.with_env(
            "DEP_PRODUCT_ID_COUNT",
            &item.all_dependencies.len().to_string(),
        );
        for (index, dependency) in item.all_dependencies.values().enumerate() {
            let prefix = format!("DEP_PRODUCT_ID_{index}");
            env = env
                .with_env(&prefix, dependency.id.as_str())
                .with_env(
                    &format!("{prefix}_BUILD_DIR"),
                    &path_string(&layout.build_dir(&dependency.id)),
                )
                .with_env(
                    &format!("{prefix}_DIST_DIR"),
                    &path_string(&layout.dist_dir(&dependency.id, dist_id)),
                )
                .with_env(
                    &format!("{prefix}_DIST_ARTIFACTS"),
                    &join_paths(&layout.dist_artifacts(dependency, dist_id)),
                );
            if let Some(name) = layout.dist_name(dependency, dist_id) {
                env = env.with_env(&format!("{prefix}_DIST_NAME"), &name);
            }
        }

        if let Some(dister) = product.dist.as_ref().and_then(|d| d.disters.get(dist_id)) {
            env = env.with_user_env(&dister.env);
        }
        env
    }

    /// Environment for building image `docker_id` of `product`
    pub fn for_docker(layout: &Layout, product: &Product, docker_id: &DockerId) -> Self {
        let mut env = Self::base(layout, product)
            .with_env("DOCKER_ID", docker_id.as_str())
            .with_env("DOCKER_TAGS", &layout.docker_tags(product, docker_id).join(" "));
        if let Some(context) = layout.docker_context_dir(product, docker_id) {
            env = env.with_env("CONTEXT_DIR", &path_string(&context));
        }
        if let Some(builder) = product.docker.as_ref().and_then(|d| d.builders.get(docker_id)) {
            env = env
                .with_env("DOCKERFILE", &builder.dockerfile)
                .with_user_env(&builder.env);
        }
        env
    }

    /// Add or replace an environment variable
    #[must_use]
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Merge user-declared variables; they win over generated ones
    #[must_use]
    pub fn with_user_env(mut self, env: &BTreeMap<String, String>) -> Self {
        for (key, value) in env {
            self.vars.insert(key.clone(), value.clone());
        }
        self
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Convert to environment variable map for process execution
    pub fn into_env_map(self) -> BTreeMap<String, String> {
        self.vars
    }
}
