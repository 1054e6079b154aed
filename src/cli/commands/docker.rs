//! Docker command implementation
//!
//! Implements `prodctl docker`: builds and packages whatever is stale, then
//! builds the selected images in dependency order.

use anyhow::Result;

use super::{orchestrator, print_report, Context, RunArgs};

/// Execute the docker command
pub async fn execute(ctx: &Context, selectors: &[String], run: &RunArgs) -> Result<()> {
    let (project, orchestrator) = orchestrator(ctx, run.dry_run)?;

    let report = orchestrator
        .docker(selectors, project.config_mod_time, &run.options(Vec::new()))
        .await?;
    print_report("Docker", &report, run.dry_run);
    Ok(())
}
