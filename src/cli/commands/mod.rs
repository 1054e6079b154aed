//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod dist;
pub mod docker;
pub mod order;
pub mod products;

use anyhow::Result;
use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{is_json, print_detail, print_success, OutputConfig};
use crate::config::defaults;
use crate::core::orchestrator::{Orchestrator, RunOptions, RunReport};
use crate::core::product::OsArch;
use crate::core::project::Project;
use crate::infra::executor::{DryRunExecutor, ScriptExecutor, StageExecutor};
use crate::infra::sink::OutputSink;

/// State shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    /// Project root
    pub project_dir: PathBuf,
    /// Global output flags
    pub output: OutputConfig,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
}

/// Flags shared by the pipeline commands
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Run build tasks in parallel
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    pub parallel: bool,

    /// Number of parallel build jobs (defaults to the number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Show what would run without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Treat every output as stale
    #[arg(long)]
    pub force: bool,
}

impl RunArgs {
    /// Orchestrator options for these flags
    pub fn options(&self, os_archs: Vec<OsArch>) -> RunOptions {
        RunOptions {
            parallel: self.parallel,
            jobs: self.jobs.unwrap_or_else(num_cpus::get),
            force: self.force,
            os_archs,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile products for their targets
    Build {
        /// Product IDs to build (all if omitted)
        selectors: Vec<String>,

        /// Only build these targets (repeatable)
        #[arg(long = "os-arch", value_name = "OS-ARCH")]
        os_archs: Vec<OsArch>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Build what is stale, then produce dist artifacts
    Dist {
        /// `PRODUCT` or `PRODUCT.DIST` selectors (all if omitted)
        selectors: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Build and dist what is stale, then build docker images
    Docker {
        /// `PRODUCT`, `PRODUCT.DOCKER` or `PRODUCT.DOCKER.TAG` selectors (all if omitted)
        selectors: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List products and their declared stages
    Products,

    /// Print the dependency-expanded execution order
    Order {
        /// Product IDs (all if omitted)
        selectors: Vec<String>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, ctx: &Context) -> Result<()> {
        match self {
            Self::Build {
                selectors,
                os_archs,
                run,
            } => build::execute(ctx, &selectors, os_archs, &run).await,
            Self::Dist { selectors, run } => dist::execute(ctx, &selectors, &run).await,
            Self::Docker { selectors, run } => docker::execute(ctx, &selectors, &run).await,
            Self::Products => products::execute(ctx),
            Self::Order { selectors } => order::execute(ctx, &selectors),
        }
    }
}

/// Load the project and wire an orchestrator for it
pub(crate) fn orchestrator(ctx: &Context, dry_run: bool) -> Result<(Project, Orchestrator)> {
    let project = Project::load(&ctx.project_dir)?;

    let executor: Arc<dyn StageExecutor> = if dry_run {
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(ScriptExecutor::new(defaults::DEFAULT_SHELL))
    };
    let sink = if ctx.output.quiet {
        OutputSink::discard()
    } else if ctx.output.json {
        OutputSink::new(std::io::stderr())
    } else {
        OutputSink::stdout()
    };

    let orchestrator = Orchestrator::new(project.catalog.clone(), project.layout.clone(), executor)
        .with_sink(sink.with_progress(ctx.output.show_progress()))
        .with_cancellation(ctx.cancel.clone());
    Ok((project, orchestrator))
}

/// Print the outcome of a pipeline command
pub(crate) fn print_report(title: &str, report: &RunReport, dry_run: bool) {
    if is_json() {
        let json = serde_json::json!({
            "status": "success",
            "dry_run": dry_run,
            "order": report.order,
            "built": report.built,
            "disted": report.disted,
            "images": report.images,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    let suffix = if dry_run { " (dry run)" } else { "" };
    if report.built.is_empty() && report.disted.is_empty() && report.images.is_empty() {
        print_success(&format!("{title}: everything up to date{suffix}"));
        return;
    }
    print_success(&format!("{title} complete!{suffix}"));
    if !report.built.is_empty() {
        print_detail(&format!("Targets built: {}", report.built.len()));
    }
    if !report.disted.is_empty() {
        print_detail(&format!("Dist outputs: {}", report.disted.join(", ")));
    }
    if !report.images.is_empty() {
        print_detail(&format!("Images: {}", report.images.join(", ")));
    }
}
