//! Loaded project
//!
//! Ties the manifest, the product catalog and the output layout together for
//! one project directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::defaults::MANIFEST_FILE;
use crate::core::layout::Layout;
use crate::core::manifest::Manifest;
use crate::core::resolver::Catalog;
use crate::error::ManifestError;
use crate::infra::filesystem;

/// A project ready to be orchestrated
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root
    pub dir: PathBuf,
    /// Parsed manifest
    pub manifest: Manifest,
    /// Products with their transitive dependencies
    pub catalog: Catalog,
    /// Output path derivation
    pub layout: Layout,
    /// Modification time of the manifest, fed to the dist staleness check
    pub config_mod_time: Option<SystemTime>,
}

impl Project {
    /// Path of the manifest inside `dir`
    pub fn manifest_path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Load the project rooted at `dir`
    pub fn load(dir: &Path) -> Result<Self, ManifestError> {
        let path = Self::manifest_path(dir);
        let manifest = Manifest::load(&path)?;
        let config_mod_time =
            filesystem::modified_time(&path).map_err(|source| ManifestError::Read {
                path: path.clone(),
                source,
            })?;

        let catalog = Catalog::new(manifest.products())?;
        let layout = Layout::new(
            dir,
            &manifest.project.version,
            &manifest.project.build_output_dir,
            &manifest.project.dist_output_dir,
        );
        tracing::debug!(
            "Loaded {} product(s) from {}",
            catalog.len(),
            path.display()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            catalog,
            layout,
            config_mod_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::product::ProductId;
    use tempfile::TempDir;

    #[test]
    fn test_load_project() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"
[project]
version = "2.0.0"

[products.foo]
dependencies = ["bar"]

[products.foo.build]
script = "true"
os_archs = ["linux-amd64"]

[products.bar.build]
script = "true"
"#,
        )
        .unwrap();

        let project = Project::load(dir.path()).unwrap();

        assert_eq!(project.catalog.len(), 2);
        assert!(project.config_mod_time.is_some());
        assert_eq!(
            project.layout.build_dir(&ProductId::from("foo")),
            dir.path().join("out/build/foo/2.0.0")
        );
        let foo = project.catalog.get(&ProductId::from("foo")).unwrap();
        assert!(foo.all_dependencies.contains_key("bar"));
    }

    #[test]
    fn test_unknown_dependency_fails_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "[products.foo]\ndependencies = [\"ghost\"]\n",
        )
        .unwrap();

        let err = Project::load(dir.path()).unwrap_err();

        assert!(err.to_string().contains("ghost"));
    }
}
