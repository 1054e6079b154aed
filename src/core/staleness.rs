//! Staleness checks
//!
//! Decides which build targets and which dist outputs of a work item must be
//! regenerated by comparing modification times of the paths derived in
//! [`crate::core::layout`]. A verdict is either `None` (everything fresh) or
//! a copy of the item narrowed to the stale sub-elements.
//!
//! Timestamps are truncated to whole seconds before comparison so that
//! filesystems with different mtime granularity agree.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::layout::Layout;
use crate::core::product::{DistId, OsArch, Product, WorkItem};
use crate::error::StalenessError;
use crate::infra::filesystem;
use crate::infra::sources::SourceEnumerator;

/// Seconds since the epoch, negative for earlier times
pub fn truncate_to_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => {
            let secs = before.duration().as_secs();
            let secs = if before.duration().subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            };
            -i64::try_from(secs).unwrap_or(i64::MAX)
        }
    }
}

fn modified(path: &Path) -> Result<Option<i64>, StalenessError> {
    filesystem::modified_time(path)
        .map(|time| time.map(truncate_to_secs))
        .map_err(|source| StalenessError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Newest modification time among the paths that exist
fn newest<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Result<Option<i64>, StalenessError> {
    let mut newest = None;
    for path in paths {
        if let Some(time) = modified(path)? {
            newest = Some(newest.map_or(time, |n: i64| n.max(time)));
        }
    }
    Ok(newest)
}

/// Oldest modification time among `paths`, or `None` if any is missing
fn oldest_if_all_exist<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
) -> Result<Option<i64>, StalenessError> {
    let mut oldest: Option<i64> = None;
    let mut any = false;
    for path in paths {
        any = true;
        match modified(path)? {
            Some(time) => oldest = Some(oldest.map_or(time, |o| o.min(time))),
            None => return Ok(None),
        }
    }
    Ok(if any { oldest } else { None })
}

/// Newest build artifact of `product` across its declared targets
fn newest_build_artifact(layout: &Layout, product: &Product) -> Result<Option<i64>, StalenessError> {
    let artifacts = layout.build_artifacts(product);
    newest(artifacts.iter().map(|(_, path)| path.as_path()))
}

/// Determine which build targets of `item` need compiling.
///
/// A target is stale when its artifact is missing or any source file is
/// strictly newer than it.
pub fn requires_build(
    layout: &Layout,
    item: &WorkItem,
    sources: &dyn SourceEnumerator,
) -> Result<Option<WorkItem>, StalenessError> {
    let product = &item.product;
    if product.build.is_none() {
        return Ok(None);
    }

    let mut newest_source: Option<Option<i64>> = None;
    let mut stale: Vec<OsArch> = Vec::new();

    for (os_arch, artifact) in layout.build_artifacts(product) {
        let Some(built) = modified(&artifact)? else {
            tracing::debug!("{} {os_arch}: artifact missing", product.id);
            stale.push(os_arch);
            continue;
        };
        if newest_source.is_none() {
            let files = sources.sources(layout.project_dir(), product)?;
            newest_source = Some(newest(files.iter().map(std::path::PathBuf::as_path))?);
        }
        if newest_source.flatten().is_some_and(|source| source > built) {
            tracing::debug!("{} {os_arch}: sources newer than artifact", product.id);
            stale.push(os_arch);
        }
    }

    if stale.is_empty() {
        return Ok(None);
    }
    Ok(Some(item.narrowed(product.with_os_archs(stale))))
}

/// Determine which dist outputs of `item` need regenerating.
///
/// For each dist ID, in order:
/// 1. any expected artifact missing: stale;
/// 2. the product's newest build artifact is strictly newer than the oldest
///    dist artifact: stale;
/// 3. `config_mod_time` is unknown, or not strictly before the oldest dist
///    artifact (equal counts as stale): stale;
/// 4. any transitive dependency's build artifacts or same-ID dist artifacts
///    are strictly newer than the oldest dist artifact: stale.
pub fn requires_dist(
    layout: &Layout,
    item: &WorkItem,
    config_mod_time: Option<SystemTime>,
) -> Result<Option<WorkItem>, StalenessError> {
    let product = &item.product;
    let dist_ids = product.dist_ids();
    if dist_ids.is_empty() {
        return Ok(None);
    }

    let config_time = config_mod_time.map(truncate_to_secs);
    let own_build = newest_build_artifact(layout, product)?;
    let mut stale: BTreeSet<DistId> = BTreeSet::new();

    for dist_id in dist_ids {
        let artifacts = layout.dist_artifacts(product, &dist_id);
        let Some(oldest_dist) = oldest_if_all_exist(artifacts.iter().map(|p| p.as_path()))? else {
            tracing::debug!("{}.{dist_id}: artifacts missing", product.id);
            stale.insert(dist_id);
            continue;
        };

        if own_build.is_some_and(|built| built > oldest_dist) {
            tracing::debug!("{}.{dist_id}: build output newer than dist", product.id);
            stale.insert(dist_id);
            continue;
        }

        if !config_time.is_some_and(|config| config < oldest_dist) {
            tracing::debug!("{}.{dist_id}: configuration not older than dist", product.id);
            stale.insert(dist_id);
            continue;
        }

        for dependency in item.all_dependencies.values() {
            let dep_build = newest_build_artifact(layout, dependency)?;
            let dep_dist_paths = layout.dist_artifacts(dependency, &dist_id);
            let dep_dist = newest(dep_dist_paths.iter().map(|p| p.as_path()))?;
            let dep_newest = dep_build.max(dep_dist);
            if dep_newest.is_some_and(|dep| dep > oldest_dist) {
                tracing::debug!(
                    "{}.{dist_id}: dependency '{}' is newer than dist",
                    product.id,
                    dependency.id
                );
                stale.insert(dist_id);
                break;
            }
        }
    }

    if stale.is_empty() {
        return Ok(None);
    }
    Ok(Some(item.narrowed(product.with_dist_ids(&stale))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::product::fixtures::*;
    use crate::core::product::ProductId;
    use crate::core::resolver::Catalog;
    use crate::infra::sources::WalkdirSources;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn touch(path: &Path, time: SystemTime) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    struct Fixture {
        dir: TempDir,
        layout: Layout,
        catalog: Catalog,
    }

    /// foo depends on bar; both build for linux-amd64 and declare dist `d`
    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path(), "1.0.0", Path::new("out/build"), Path::new("out/dist"));
        let catalog = Catalog::new(product_map(vec![
            depends_on(add_dists(with_build("foo", &["linux-amd64"]), &["d"]), &["bar"]),
            add_dists(with_build("bar", &["linux-amd64"]), &["d"]),
        ]))
        .unwrap();
        Fixture { dir, layout, catalog }
    }

    impl Fixture {
        fn item(&self, id: &str) -> &WorkItem {
            self.catalog.get(&ProductId::from(id)).unwrap()
        }

        fn build_artifact(&self, id: &str) -> PathBuf {
            let product = &self.item(id).product;
            self.layout.build_artifacts(product)[0].1.clone()
        }

        fn dist_artifact(&self, id: &str) -> PathBuf {
            let product = &self.item(id).product;
            self.layout.dist_artifacts(product, &DistId::from("d"))[0].clone()
        }

        /// Lay down a consistent, fully fresh set of outputs
        fn materialize(&self) {
            touch(&self.build_artifact("bar"), at(10));
            touch(&self.build_artifact("foo"), at(10));
            touch(&self.dist_artifact("bar"), at(20));
            touch(&self.dist_artifact("foo"), at(30));
        }
    }

    #[test]
    fn test_truncation_handles_pre_epoch() {
        assert_eq!(truncate_to_secs(UNIX_EPOCH + Duration::from_millis(1500)), 1);
        assert_eq!(truncate_to_secs(UNIX_EPOCH - Duration::from_millis(1500)), -2);
    }

    #[test]
    fn test_build_missing_artifact_is_stale() {
        let f = fixture();
        let verdict = requires_build(&f.layout, f.item("foo"), &WalkdirSources).unwrap();

        let stale = verdict.unwrap();
        assert_eq!(stale.product.os_archs(), &[OsArch::new("linux", "amd64")]);
    }

    #[test]
    fn test_build_fresh_when_sources_older() {
        let f = fixture();
        let mut foo = f.item("foo").clone();
        foo.product.build.as_mut().unwrap().source_dir = Some(PathBuf::from("src/foo"));
        touch(&f.dir.path().join("src/foo/main.c"), at(5));
        touch(&f.build_artifact("foo"), at(10));

        assert!(requires_build(&f.layout, &foo, &WalkdirSources).unwrap().is_none());
    }

    #[test]
    fn test_build_stale_when_source_newer() {
        let f = fixture();
        let mut foo = f.item("foo").clone();
        foo.product.build.as_mut().unwrap().source_dir = Some(PathBuf::from("src/foo"));
        touch(&f.dir.path().join("src/foo/main.c"), at(11));
        touch(&f.build_artifact("foo"), at(10));

        assert!(requires_build(&f.layout, &foo, &WalkdirSources).unwrap().is_some());
    }

    #[test]
    fn test_build_same_second_source_is_fresh() {
        let f = fixture();
        let mut foo = f.item("foo").clone();
        foo.product.build.as_mut().unwrap().source_dir = Some(PathBuf::from("src/foo"));
        touch(&f.dir.path().join("src/foo/main.c"), at(10) + Duration::from_millis(900));
        touch(&f.build_artifact("foo"), at(10));

        assert!(requires_build(&f.layout, &foo, &WalkdirSources).unwrap().is_none());
    }

    #[test]
    fn test_dist_missing_artifacts_are_stale() {
        let f = fixture();
        let verdict = requires_dist(&f.layout, f.item("foo"), Some(at(0))).unwrap();

        assert_eq!(verdict.unwrap().product.dist_ids(), vec![DistId::from("d")]);
    }

    #[test]
    fn test_dist_fresh_outputs_are_skipped() {
        let f = fixture();
        f.materialize();

        assert!(requires_dist(&f.layout, f.item("foo"), Some(at(0))).unwrap().is_none());
        assert!(requires_dist(&f.layout, f.item("bar"), Some(at(0))).unwrap().is_none());
    }

    #[test]
    fn test_dist_check_is_idempotent() {
        let f = fixture();
        f.materialize();

        let first = requires_dist(&f.layout, f.item("foo"), Some(at(0))).unwrap();
        let second = requires_dist(&f.layout, f.item("foo"), Some(at(0))).unwrap();
        assert!(first.is_none());
        assert!(second.is_none());
    }

    #[test]
    fn test_dist_stale_when_own_build_newer() {
        let f = fixture();
        f.materialize();
        touch(&f.build_artifact("foo"), at(31));

        assert!(requires_dist(&f.layout, f.item("foo"), Some(at(0))).unwrap().is_some());
    }

    #[test]
    fn test_dist_unknown_config_time_is_stale() {
        let f = fixture();
        f.materialize();

        assert!(requires_dist(&f.layout, f.item("foo"), None).unwrap().is_some());
    }

    #[test]
    fn test_dist_config_time_equal_is_stale() {
        let f = fixture();
        f.materialize();

        let same_second = at(30) + Duration::from_millis(500);
        assert!(requires_dist(&f.layout, f.item("foo"), Some(same_second))
            .unwrap()
            .is_some());
        assert!(requires_dist(&f.layout, f.item("foo"), Some(at(29)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dist_dependency_bump_cascades() {
        let f = fixture();
        f.materialize();
        touch(&f.dist_artifact("bar"), at(40));

        assert!(requires_dist(&f.layout, f.item("foo"), Some(at(0))).unwrap().is_some());
        assert!(requires_dist(&f.layout, f.item("bar"), Some(at(0))).unwrap().is_none());
    }

    #[test]
    fn test_dist_dependency_build_bump_cascades() {
        let f = fixture();
        f.materialize();
        touch(&f.build_artifact("bar"), at(35));

        assert!(requires_dist(&f.layout, f.item("foo"), Some(at(0))).unwrap().is_some());
    }

    #[test]
    fn test_dist_partial_rebuild_per_dist_id() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path(), "1.0.0", Path::new("b"), Path::new("d"));
        let catalog = Catalog::new(product_map(vec![add_dists(
            with_build("foo", &["linux-amd64"]),
            &["tgz", "zip"],
        )]))
        .unwrap();
        let item = catalog.get(&ProductId::from("foo")).unwrap();
        touch(&layout.build_artifacts(&item.product)[0].1, at(0));
        touch(&layout.dist_artifacts(&item.product, &DistId::from("tgz"))[0], at(10));

        let stale = requires_dist(&layout, item, Some(at(0))).unwrap().unwrap();
        assert_eq!(stale.product.dist_ids(), vec![DistId::from("zip")]);
    }

    #[test]
    fn test_product_without_dist_is_never_stale() {
        let f = fixture();
        let plain = WorkItem {
            product: with_build("plain", &["linux-amd64"]),
            all_dependencies: std::collections::BTreeMap::new(),
        };

        assert!(requires_dist(&f.layout, &plain, None).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_stat_errors_propagate() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture();
        let dist_dir = f.dist_artifact("foo").parent().unwrap().to_path_buf();
        touch(&f.dist_artifact("foo"), at(30));
        std::fs::set_permissions(&dist_dir, std::fs::Permissions::from_mode(0o000)).unwrap();

        let result = requires_dist(&f.layout, f.item("foo"), Some(at(0)));
        std::fs::set_permissions(&dist_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        // root ignores directory permissions, so only a failure is checked
        if let Err(err) = result {
            assert!(matches!(err, StalenessError::Io { .. }));
        }
    }
}
