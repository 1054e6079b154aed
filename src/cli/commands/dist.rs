//! Dist command implementation
//!
//! Implements `prodctl dist`: builds whatever is stale, then produces the
//! stale dist outputs of the selected products and their dependencies.

use anyhow::Result;

use super::{orchestrator, print_report, Context, RunArgs};

/// Execute the dist command
pub async fn execute(ctx: &Context, selectors: &[String], run: &RunArgs) -> Result<()> {
    let (project, orchestrator) = orchestrator(ctx, run.dry_run)?;

    let report = orchestrator
        .dist(selectors, project.config_mod_time, &run.options(Vec::new()))
        .await?;
    print_report("Dist", &report, run.dry_run);
    Ok(())
}
