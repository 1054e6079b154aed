//! Dependency resolution
//!
//! Computes transitive dependency sets, builds the product dependency graph
//! and linearizes it into a deterministic build order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::core::product::{Product, ProductId, WorkItem};
use crate::error::GraphError;

/// The loaded product set, with each product's transitive dependencies
/// computed once up front.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: BTreeMap<ProductId, WorkItem>,
}

impl Catalog {
    /// Index `products` and compute every transitive dependency set.
    ///
    /// Fails if any product references a dependency that is not defined.
    pub fn new(products: BTreeMap<ProductId, Product>) -> Result<Self, GraphError> {
        let mut items = BTreeMap::new();
        for id in products.keys() {
            let all_dependencies = all_dependencies(&products, id)?;
            items.insert(
                id.clone(),
                WorkItem {
                    product: products[id].clone(),
                    all_dependencies,
                },
            );
        }
        Ok(Self { items })
    }

    /// Look up the un-narrowed work item for a product
    pub fn get(&self, id: &ProductId) -> Option<&WorkItem> {
        self.items.get(id)
    }

    /// All products in canonical order
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.values()
    }

    /// All product IDs in canonical order
    pub fn ids(&self) -> impl Iterator<Item = &ProductId> {
        self.items.keys()
    }

    /// Number of products
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the catalog has no products
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Compute the transitive closure of `id`'s dependencies.
///
/// The product itself is never part of its own closure, even when it sits on
/// a cycle; cycles are reported when the graph is ordered.
pub fn all_dependencies(
    products: &BTreeMap<ProductId, Product>,
    id: &ProductId,
) -> Result<BTreeMap<ProductId, Product>, GraphError> {
    let mut closure = BTreeMap::new();
    let mut pending: Vec<&ProductId> = vec![id];
    let mut seen: BTreeSet<&ProductId> = BTreeSet::new();

    while let Some(current) = pending.pop() {
        if !seen.insert(current) {
            continue;
        }
        let Some(product) = products.get(current) else {
            continue;
        };
        for dep in &product.dependencies {
            let Some(dep_product) = products.get(dep) else {
                return Err(GraphError::MissingDependency {
                    product: current.to_string(),
                    dependency: dep.to_string(),
                });
            };
            if dep != id {
                closure.insert(dep.clone(), dep_product.clone());
            }
            pending.push(dep);
        }
    }

    Ok(closure)
}

/// Dependency graph for products.
///
/// Edges point from a dependency to its dependents: an edge `D -> P` means
/// "D must be produced before P".
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// All known products
    nodes: BTreeSet<ProductId>,
    /// Adjacency list: dependency -> dependents
    dependents: BTreeMap<ProductId, BTreeSet<ProductId>>,
}

impl DependencyGraph {
    /// Build the graph for a product set.
    ///
    /// Fails without attempting to order anything if a product declares a
    /// dependency that is not in the set.
    pub fn build<'a>(products: impl IntoIterator<Item = &'a Product>) -> Result<Self, GraphError> {
        let products: Vec<&Product> = products.into_iter().collect();
        let nodes: BTreeSet<ProductId> = products.iter().map(|p| p.id.clone()).collect();
        let mut dependents: BTreeMap<ProductId, BTreeSet<ProductId>> = BTreeMap::new();

        for product in &products {
            for dep in &product.dependencies {
                if !nodes.contains(dep) {
                    return Err(GraphError::MissingDependency {
                        product: product.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(product.id.clone());
            }
        }

        Ok(Self { nodes, dependents })
    }

    /// Products that directly depend on `id`, in canonical order
    pub fn dependents(&self, id: &ProductId) -> impl Iterator<Item = &ProductId> {
        self.dependents.get(id).into_iter().flatten()
    }

    /// Compute topological order (build order) with Kahn's algorithm.
    ///
    /// Ready nodes are seeded and visited in lexicographic order so the same
    /// graph always yields the same sequence.
    pub fn order(&self) -> Result<Vec<ProductId>, GraphError> {
        let mut in_degree: BTreeMap<&ProductId, usize> =
            self.nodes.iter().map(|node| (node, 0)).collect();
        for targets in self.dependents.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree += 1;
                }
            }
        }

        let mut ready: VecDeque<&ProductId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_front() {
            order.push(node.clone());
            for dependent in self.dependents(node) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let ordered: BTreeSet<&ProductId> = order.iter().collect();
            let products = self
                .nodes
                .iter()
                .filter(|node| !ordered.contains(node))
                .map(ToString::to_string)
                .collect();
            return Err(GraphError::Cycle { products });
        }

        Ok(order)
    }
}
