//! Build command implementation
//!
//! Implements `prodctl build` to compile the selected products for their
//! declared targets.

use anyhow::Result;

use super::{orchestrator, print_report, Context, RunArgs};
use crate::core::product::OsArch;

/// Execute the build command
pub async fn execute(
    ctx: &Context,
    selectors: &[String],
    os_archs: Vec<OsArch>,
    run: &RunArgs,
) -> Result<()> {
    let (project, orchestrator) = orchestrator(ctx, run.dry_run)?;
    tracing::info!(
        "Building {} (version {})",
        if selectors.is_empty() {
            "all products".to_string()
        } else {
            selectors.join(", ")
        },
        project.layout.version()
    );

    let report = orchestrator.build(selectors, &run.options(os_archs)).await?;
    print_report("Build", &report, run.dry_run);
    Ok(())
}
