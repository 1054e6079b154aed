//! Products command implementation
//!
//! Implements `prodctl products`, listing every product with its declared
//! stages and direct dependencies.

use anyhow::Result;

use crate::cli::output::{is_json, print_warning};
use crate::core::project::Project;

use super::Context;

/// Execute the products command
pub fn execute(ctx: &Context) -> Result<()> {
    let project = Project::load(&ctx.project_dir)?;
    if project.catalog.is_empty() {
        print_warning(&format!(
            "No products declared in {}",
            Project::manifest_path(&project.dir).display()
        ));
    }

    if is_json() {
        let products: Vec<_> = project
            .catalog
            .items()
            .map(|item| {
                let product = &item.product;
                serde_json::json!({
                    "id": product.id,
                    "stages": product.stage_names(),
                    "dependencies": product.dependencies,
                    "os_archs": product.os_archs(),
                    "dists": product.dist_ids(),
                    "dockers": product.docker_ids(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&products)?);
        return Ok(());
    }

    let width = project.catalog.ids().map(|id| id.as_str().len()).max().unwrap_or(0);
    for item in project.catalog.items() {
        let product = &item.product;
        let mut line = format!("{:width$}  [{}]", product.id.as_str(), product.stage_names().join(", "));
        if !product.dependencies.is_empty() {
            let deps: Vec<&str> = product.dependencies.iter().map(|d| d.as_str()).collect();
            line.push_str(&format!("  depends on: {}", deps.join(", ")));
        }
        println!("{line}");
    }
    Ok(())
}
