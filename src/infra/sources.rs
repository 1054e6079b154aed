//! Source file enumeration
//!
//! The build staleness check compares build artifacts against the files a
//! product is compiled from. Which files those are is decided here.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::product::Product;
use crate::error::StalenessError;

/// Lists the input files of a product's build
pub trait SourceEnumerator: Send + Sync {
    /// Source files of `product`, as paths under `project_dir`
    fn sources(&self, project_dir: &Path, product: &Product) -> Result<Vec<PathBuf>, StalenessError>;
}

/// Walks the product's `source_dir`, skipping hidden files and directories.
///
/// Products without a `source_dir` have no tracked sources, so only missing
/// artifacts make them stale.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkdirSources;

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

impl SourceEnumerator for WalkdirSources {
    fn sources(&self, project_dir: &Path, product: &Product) -> Result<Vec<PathBuf>, StalenessError> {
        let Some(source_dir) = product.build.as_ref().and_then(|b| b.source_dir.as_ref()) else {
            return Ok(Vec::new());
        };
        let root = project_dir.join(source_dir);
        let exists = root.try_exists().map_err(|e| StalenessError::Sources {
            product: product.id.to_string(),
            error: format!("{}: {e}", root.display()),
        })?;
        if !exists {
            tracing::warn!(
                "Source directory for '{}' does not exist: {}",
                product.id,
                root.display()
            );
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry.map_err(|e| StalenessError::Sources {
                product: product.id.to_string(),
                error: e.to_string(),
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::product::fixtures::with_build;
    use tempfile::TempDir;

    #[test]
    fn test_walks_source_dir_skipping_hidden() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("cmd/foo");
        std::fs::create_dir_all(src.join(".git")).unwrap();
        std::fs::create_dir_all(src.join("pkg")).unwrap();
        std::fs::write(src.join("main.c"), "int main;").unwrap();
        std::fs::write(src.join("pkg/util.c"), "").unwrap();
        std::fs::write(src.join(".git/HEAD"), "").unwrap();

        let mut product = with_build("foo", &["linux-amd64"]);
        product.build.as_mut().unwrap().source_dir = Some(PathBuf::from("cmd/foo"));

        let files = WalkdirSources.sources(dir.path(), &product).unwrap();
        assert_eq!(files, vec![src.join("main.c"), src.join("pkg/util.c")]);
    }

    #[test]
    fn test_no_source_dir_means_no_sources() {
        let dir = TempDir::new().unwrap();
        let product = with_build("foo", &["linux-amd64"]);

        assert!(WalkdirSources.sources(dir.path(), &product).unwrap().is_empty());
    }

    #[test]
    fn test_missing_source_dir_means_no_sources() {
        let dir = TempDir::new().unwrap();
        let mut product = with_build("foo", &["linux-amd64"]);
        product.build.as_mut().unwrap().source_dir = Some(PathBuf::from("cmd/foo"));

        assert!(WalkdirSources.sources(dir.path(), &product).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_source_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README"), "").unwrap();
        let mut product = with_build("foo", &["linux-amd64"]);
        product.build.as_mut().unwrap().source_dir = Some(PathBuf::from("README/src"));

        let err = WalkdirSources.sources(dir.path(), &product).unwrap_err();

        assert!(matches!(err, StalenessError::Sources { .. }));
    }
}
