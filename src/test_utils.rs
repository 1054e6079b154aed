//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use crate::core::product::{OsArch, Product};
    use proptest::prelude::*;

    /// Generate a valid product ID (lowercase alphanumeric with hyphens, no dots)
    pub fn product_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    /// Generate a valid semver version string
    pub fn semver_version() -> impl Strategy<Value = String> {
        (0u32..100, 0u32..100, 0u32..100)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate a build target
    pub fn os_arch() -> impl Strategy<Value = OsArch> {
        (
            prop_oneof![Just("linux"), Just("darwin"), Just("windows")],
            prop_oneof![Just("amd64"), Just("arm64"), Just("386")],
        )
            .prop_map(|(os, arch)| OsArch::new(os, arch))
    }

    /// Generate `count` products `p0..p{count-1}` wired into an acyclic graph.
    ///
    /// Dependencies only point from higher to lower indices.
    pub fn acyclic_products(count: usize) -> impl Strategy<Value = Vec<Product>> {
        proptest::collection::vec((0..count, 0..count), 0..count * 3).prop_map(move |edges| {
            let mut products: Vec<Product> =
                (0..count).map(|i| Product::new(format!("p{i}"))).collect();
            for (a, b) in edges {
                let (low, high) = if a < b { (a, b) } else if b < a { (b, a) } else { continue };
                let dep = products[low].id.clone();
                if !products[high].dependencies.contains(&dep) {
                    products[high].dependencies.push(dep);
                }
            }
            products
        })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_product_id_generator(id in product_id()) {
            prop_assert!(!id.is_empty());
            prop_assert!(!id.contains('.'));
        }

        #[test]
        fn test_os_arch_generator_round_trips(target in os_arch()) {
            let parsed: crate::core::product::OsArch = target.to_string().parse().unwrap();
            prop_assert_eq!(parsed, target);
        }

        #[test]
        fn test_acyclic_products_only_point_backwards(products in acyclic_products(6)) {
            for (index, product) in products.iter().enumerate() {
                for dep in &product.dependencies {
                    let dep_index: usize = dep.as_str()[1..].parse().unwrap();
                    prop_assert!(dep_index < index);
                }
            }
        }
    }
}
