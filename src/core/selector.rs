//! Selector parsing and resolution
//!
//! A selector names a product (`foo`), one of its dist outputs or docker
//! images (`foo.tgz`, `foo.image`), or a single docker tag
//! (`foo.image.latest`). Segments are dot-delimited with no escaping.
//! Omitted trailing segments select every declared value of that dimension.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::product::{DistId, DockerId, OsArch, ProductId, TagId, WorkItem};
use crate::core::resolver::Catalog;
use crate::error::SelectorError;

/// Which sub-dimension selectors may address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    /// Product IDs only
    Product,
    /// `product` or `product.dist`
    Dist,
    /// `product`, `product.image` or `product.image.tag`
    Docker,
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::Dist => write!(f, "dist"),
            Self::Docker => write!(f, "docker"),
        }
    }
}

/// A parsed selector
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Selector {
    /// Product segment
    pub product: ProductId,
    /// Dist or docker ID segment
    pub sub: Option<String>,
    /// Docker tag segment
    pub tag: Option<String>,
}

impl Selector {
    /// Parse `ID`, `ID.SUB` or `ID.SUB.TAG`.
    ///
    /// Returns `None` for empty segments or more than three segments.
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self {
            product: ProductId::from(parts[0]),
            sub: parts.get(1).map(|s| (*s).to_string()),
            tag: parts.get(2).map(|s| (*s).to_string()),
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.product)?;
        if let Some(sub) = &self.sub {
            write!(f, ".{sub}")?;
        }
        if let Some(tag) = &self.tag {
            write!(f, ".{tag}")?;
        }
        Ok(())
    }
}

/// Every fully-qualified ID a selector of `kind` may name, sorted
pub fn valid_ids(catalog: &Catalog, kind: SelectorKind) -> BTreeSet<String> {
    let mut valid = BTreeSet::new();
    for item in catalog.items() {
        let product = &item.product;
        valid.insert(product.id.to_string());
        match kind {
            SelectorKind::Product => {}
            SelectorKind::Dist => {
                for dist_id in product.dist_ids() {
                    valid.insert(format!("{}.{dist_id}", product.id));
                }
            }
            SelectorKind::Docker => {
                if let Some(docker) = &product.docker {
                    for (docker_id, builder) in &docker.builders {
                        valid.insert(format!("{}.{docker_id}", product.id));
                        for tag in &builder.tags {
                            valid.insert(format!("{}.{docker_id}.{}", product.id, tag.id));
                        }
                    }
                }
            }
        }
    }
    valid
}

/// What a set of selectors picked for one product
#[derive(Debug, Default)]
struct Picked {
    dists: BTreeSet<DistId>,
    images: BTreeMap<DockerId, BTreeSet<TagId>>,
}

/// Resolve selectors into narrowed work items, sorted by product ID.
///
/// With no selectors every product is returned un-narrowed. Otherwise every
/// selector is validated first and all invalid ones are reported together.
pub fn resolve(
    catalog: &Catalog,
    kind: SelectorKind,
    selectors: &[String],
) -> Result<Vec<WorkItem>, SelectorError> {
    if selectors.is_empty() {
        return Ok(catalog.items().cloned().collect());
    }

    let valid = valid_ids(catalog, kind);
    let invalid: BTreeSet<&String> = selectors
        .iter()
        .filter(|s| !valid.contains(s.as_str()))
        .collect();
    if !invalid.is_empty() {
        return Err(SelectorError::Invalid {
            kind: kind.to_string(),
            invalid: invalid.into_iter().cloned().collect(),
            valid: valid.into_iter().collect(),
        });
    }

    let mut picked: BTreeMap<ProductId, Picked> = BTreeMap::new();
    for raw in selectors {
        let Some(selector) = Selector::parse(raw) else {
            continue;
        };
        let Some(item) = catalog.get(&selector.product) else {
            continue;
        };
        let product = &item.product;
        let entry = picked.entry(selector.product.clone()).or_default();

        match kind {
            SelectorKind::Product => {}
            SelectorKind::Dist => match &selector.sub {
                Some(sub) => {
                    entry.dists.insert(DistId::from(sub.as_str()));
                }
                None => entry.dists.extend(product.dist_ids()),
            },
            SelectorKind::Docker => {
                let Some(docker) = &product.docker else {
                    continue;
                };
                for (docker_id, builder) in &docker.builders {
                    if selector.sub.as_deref().is_some_and(|s| s != docker_id.as_str()) {
                        continue;
                    }
                    let tags = entry.images.entry(docker_id.clone()).or_default();
                    match &selector.tag {
                        Some(tag) => {
                            tags.insert(TagId::from(tag.as_str()));
                        }
                        None => tags.extend(builder.tags.iter().map(|t| t.id.clone())),
                    }
                }
            }
        }
    }

    let mut resolved = Vec::with_capacity(picked.len());
    for (id, picks) in picked {
        let Some(item) = catalog.get(&id) else {
            continue;
        };
        let product = &item.product;
        let narrowed = match kind {
            SelectorKind::Product => product.clone(),
            SelectorKind::Dist => {
                let narrowed = product.with_dist_ids(&picks.dists);
                if narrowed.dist.as_ref().is_some_and(|d| d.disters.is_empty()) {
                    continue;
                }
                narrowed
            }
            SelectorKind::Docker => {
                let narrowed = product.with_docker_selection(&picks.images);
                if narrowed.docker.as_ref().is_some_and(|d| d.builders.is_empty()) {
                    continue;
                }
                narrowed
            }
        };
        resolved.push(item.narrowed(narrowed));
    }

    Ok(resolved)
}

/// Resolve product selectors for the build phase and intersect every
/// product's targets with `os_archs` when it is non-empty.
///
/// Products whose intersection is empty (including products with no build
/// stage) are dropped: there is nothing to do for those targets.
pub fn resolve_build(
    catalog: &Catalog,
    selectors: &[String],
    os_archs: &[OsArch],
) -> Result<Vec<WorkItem>, SelectorError> {
    let items = resolve(catalog, SelectorKind::Product, selectors)?;
    if os_archs.is_empty() {
        return Ok(items);
    }

    let allowed: BTreeSet<&OsArch> = os_archs.iter().collect();
    Ok(items
        .into_iter()
        .filter_map(|item| {
            let kept: Vec<OsArch> = item
                .product
                .os_archs()
                .iter()
                .filter(|target| allowed.contains(target))
                .cloned()
                .collect();
            if kept.is_empty() {
                None
            } else {
                let narrowed = item.product.with_os_archs(kept);
                Some(item.narrowed(narrowed))
            }
        })
        .collect())
}
