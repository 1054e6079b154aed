//! Order command implementation
//!
//! Implements `prodctl order`, printing the dependency-expanded execution
//! order for a set of product selectors.

use anyhow::Result;

use super::{orchestrator, Context};
use crate::cli::output::is_json;

/// Execute the order command
pub fn execute(ctx: &Context, selectors: &[String]) -> Result<()> {
    let (_, orchestrator) = orchestrator(ctx, true)?;
    let order = orchestrator.plan(selectors)?;

    if is_json() {
        println!("{}", serde_json::to_string_pretty(&order)?);
        return Ok(());
    }
    for id in &order {
        println!("{id}");
    }
    Ok(())
}
