//! Phase orchestration
//!
//! Drives the Build → Dist → Docker pipeline for one invocation. Selection,
//! dependency expansion, ordering and staleness are computed up front; only
//! the build phase fans out into a bounded worker pool. Dist and docker walk
//! the topological order one product at a time because a product may read
//! what its dependencies just wrote.
//!
//! Any failure aborts the pipeline. Outputs already written stay on disk; a
//! retry relies on the staleness checks to find the remaining work.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::build_env::ScriptEnvironment;
use crate::core::layout::Layout;
use crate::core::product::{DistId, DockerId, OsArch, Phase, ProductId, WorkItem};
use crate::core::resolver::{Catalog, DependencyGraph};
use crate::core::selector::{self, SelectorKind};
use crate::core::staleness;
use crate::error::{ExecError, PipelineError};
use crate::infra::executor::{
    BuildRequest, ContextInput, DistRequest, DockerRequest, StageExecutor,
};
use crate::infra::sink::OutputSink;
use crate::infra::sources::{SourceEnumerator, WalkdirSources};

/// Caller-controlled knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Fan build tasks out into a worker pool
    pub parallel: bool,
    /// Worker pool size
    pub jobs: usize,
    /// Treat everything as stale
    pub force: bool,
    /// Restrict the build command to these targets (empty = all)
    pub os_archs: Vec<OsArch>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: num_cpus::get(),
            force: false,
            os_archs: Vec::new(),
        }
    }
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Products considered, in execution order
    pub order: Vec<ProductId>,
    /// Build targets compiled, as `product os-arch`
    pub built: Vec<String>,
    /// Dist outputs produced, as `product.dist`
    pub disted: Vec<String>,
    /// Images built, as `product.docker`
    pub images: Vec<String>,
}

/// The dependency-expanded working set of one invocation
#[derive(Debug, Clone, Default)]
pub struct Classified {
    /// Requested products (narrowed) plus every transitive dependency
    pub all: BTreeMap<ProductId, WorkItem>,
    /// Products the selectors named
    pub specified: BTreeSet<ProductId>,
    /// Products present only because something depends on them
    pub dependency_only: BTreeSet<ProductId>,
}

impl Classified {
    /// Expand resolved items with their transitive dependencies.
    ///
    /// Requested items keep their narrowing; dependencies enter un-narrowed.
    pub fn new(catalog: &Catalog, items: Vec<WorkItem>) -> Self {
        let mut classified = Self::default();
        let mut dependencies = BTreeSet::new();
        for item in items {
            dependencies.extend(item.all_dependencies.keys().cloned());
            classified.specified.insert(item.id().clone());
            classified.all.insert(item.id().clone(), item);
        }
        for id in dependencies {
            if classified.specified.contains(&id) {
                continue;
            }
            if let Some(item) = catalog.get(&id) {
                classified.dependency_only.insert(id.clone());
                classified.all.insert(id, item.clone());
            }
        }
        classified
    }

    /// Products worth processing for `phase`: everything specified, every
    /// product declaring the phase's stage, and every dependency of those.
    pub fn kept(&self, phase: Phase) -> BTreeSet<ProductId> {
        let mut kept = self.specified.clone();
        for item in self.all.values() {
            if item.product.declares(phase) {
                kept.insert(item.id().clone());
                kept.extend(item.all_dependencies.keys().cloned());
            }
        }
        for id in self.dependency_only.difference(&kept) {
            tracing::debug!("Skipping '{id}': no {phase} stage and nothing needs it");
        }
        kept
    }

    /// Topological order of the whole working set
    pub fn order(&self) -> Result<Vec<ProductId>, PipelineError> {
        let graph = DependencyGraph::build(self.all.values().map(|item| &item.product))?;
        Ok(graph.order()?)
    }
}

/// Runs the pipeline phases for a loaded project
pub struct Orchestrator {
    catalog: Catalog,
    layout: Layout,
    executor: Arc<dyn StageExecutor>,
    sources: Arc<dyn SourceEnumerator>,
    sink: OutputSink,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator writing task output nowhere
    pub fn new(catalog: Catalog, layout: Layout, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            catalog,
            layout,
            executor,
            sources: Arc::new(WalkdirSources),
            sink: OutputSink::discard(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a different source enumerator for build staleness
    #[must_use]
    pub fn with_sources(mut self, sources: Arc<dyn SourceEnumerator>) -> Self {
        self.sources = sources;
        self
    }

    /// Send task output to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }

    /// Abort work when `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Loaded products
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Resolve product selectors and return the dependency-expanded
    /// execution order without running anything
    pub fn plan(&self, selectors: &[String]) -> Result<Vec<ProductId>, PipelineError> {
        let items = selector::resolve(&self.catalog, SelectorKind::Product, selectors)?;
        Classified::new(&self.catalog, items).order()
    }

    /// Compile the selected products.
    ///
    /// Only the products the selectors name are compiled, restricted to
    /// `opts.os_archs` when given.
    pub async fn build(
        &self,
        selectors: &[String],
        opts: &RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let items = selector::resolve_build(&self.catalog, selectors, &opts.os_archs)?;
        let classified = Classified::new(&self.catalog, items);
        let order: Vec<ProductId> = classified
            .order()?
            .into_iter()
            .filter(|id| classified.specified.contains(id))
            .collect();

        let targets: Vec<&WorkItem> = order.iter().filter_map(|id| classified.all.get(id)).collect();
        let built = self.build_phase(&targets, opts).await?;

        Ok(RunReport {
            order,
            built,
            ..RunReport::default()
        })
    }

    /// Build what is stale, then produce the stale dist outputs of the
    /// selected products and their dependencies.
    pub async fn dist(
        &self,
        selectors: &[String],
        config_mod_time: Option<SystemTime>,
        opts: &RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let items = selector::resolve(&self.catalog, SelectorKind::Dist, selectors)?;
        self.run_pipeline(Phase::Dist, items, config_mod_time, opts).await
    }

    /// Build and dist what is stale, then build the selected images
    pub async fn docker(
        &self,
        selectors: &[String],
        config_mod_time: Option<SystemTime>,
        opts: &RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let items = selector::resolve(&self.catalog, SelectorKind::Docker, selectors)?;
        self.run_pipeline(Phase::Docker, items, config_mod_time, opts).await
    }

    async fn run_pipeline(
        &self,
        phase: Phase,
        items: Vec<WorkItem>,
        mut config_mod_time: Option<SystemTime>,
        opts: &RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let classified = Classified::new(&self.catalog, items);
        let kept = classified.kept(phase);
        let order: Vec<ProductId> = classified
            .order()?
            .into_iter()
            .filter(|id| kept.contains(id))
            .collect();
        let ordered: Vec<&WorkItem> = order.iter().filter_map(|id| classified.all.get(id)).collect();

        let built = self.build_phase(&ordered, opts).await?;
        if !built.is_empty() {
            tracing::debug!("Rebuilt {} target(s); treating configuration as changed", built.len());
            config_mod_time = None;
        }

        let disted = self.dist_phase(&ordered, config_mod_time, opts).await?;

        let images = if phase == Phase::Docker {
            self.docker_phase(&ordered).await?
        } else {
            Vec::new()
        };

        Ok(RunReport {
            order,
            built,
            disted,
            images,
        })
    }

    /// Wait for `work` unless the run is cancelled first
    async fn guarded(
        &self,
        work: impl Future<Output = Result<String, ExecError>>,
    ) -> Result<String, ExecError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ExecError::Cancelled),
            result = work => result,
        }
    }

    fn build_requests(
        &self,
        items: &[&WorkItem],
        opts: &RunOptions,
    ) -> Result<Vec<BuildRequest>, PipelineError> {
        let mut requests = Vec::new();
        for item in items {
            let stale = if opts.force {
                Some((*item).clone())
            } else {
                staleness::requires_build(&self.layout, item, self.sources.as_ref())?
            };
            let Some(stale) = stale else {
                tracing::debug!("Build of '{}' is up to date", item.id());
                continue;
            };
            let product = &stale.product;
            let Some(build) = &product.build else {
                continue;
            };
            for os_arch in product.os_archs() {
                let Some(output) = self.layout.build_artifact(product, os_arch) else {
                    continue;
                };
                requests.push(BuildRequest {
                    product: product.id.clone(),
                    os_arch: os_arch.clone(),
                    script: build.script.clone(),
                    output,
                    working_dir: self.layout.project_dir().to_path_buf(),
                    env: ScriptEnvironment::for_build(&self.layout, product, os_arch).into_env_map(),
                });
            }
        }
        Ok(requests)
    }

    /// Compile every stale target of `items`; returns the compiled targets
    async fn build_phase(
        &self,
        items: &[&WorkItem],
        opts: &RunOptions,
    ) -> Result<Vec<String>, PipelineError> {
        let requests = self.build_requests(items, opts)?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!("Building {} target(s)", requests.len());

        let mut built = if opts.parallel && requests.len() > 1 {
            self.build_parallel(requests, opts.jobs).await?
        } else {
            self.build_serial(requests).await?
        };
        built.sort();
        Ok(built)
    }

    async fn build_serial(&self, requests: Vec<BuildRequest>) -> Result<Vec<String>, PipelineError> {
        let pb = self.sink.progress_bar(requests.len() as u64);
        let mut built = Vec::with_capacity(requests.len());
        for request in requests {
            pb.set_message(request.label());
            let output = self
                .guarded(self.executor.build(&request))
                .await
                .map_err(|e| PipelineError::exec(request.product.as_str(), Phase::Build, e))?;
            self.sink.emit(&request.label(), &output);
            pb.inc(1);
            built.push(format!("{} {}", request.product, request.os_arch));
        }
        pb.finish_and_clear();
        Ok(built)
    }

    /// Bounded worker pool. The first failure cancels the remaining workers
    /// and is the error returned.
    async fn build_parallel(
        &self,
        requests: Vec<BuildRequest>,
        jobs: usize,
    ) -> Result<Vec<String>, PipelineError> {
        let pb = self.sink.progress_bar(requests.len() as u64);
        let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
        let token = self.cancel.child_token();
        let mut set = JoinSet::new();

        for request in requests {
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let sink = self.sink.clone();
            let token = token.clone();
            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return (request, Err(ExecError::Cancelled));
                };
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => Err(ExecError::Cancelled),
                    result = executor.build(&request) => result,
                };
                if let Ok(output) = &result {
                    sink.emit(&request.label(), output);
                }
                (request, result)
            });
        }

        let mut built = Vec::new();
        let mut first_error: Option<PipelineError> = None;
        let mut first_is_cancellation = false;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((request, Ok(_))) => {
                    pb.inc(1);
                    pb.set_message(request.label());
                    built.push(format!("{} {}", request.product, request.os_arch));
                }
                Ok((request, Err(err))) => {
                    token.cancel();
                    let cancellation = matches!(err, ExecError::Cancelled);
                    if first_error.is_none() || (first_is_cancellation && !cancellation) {
                        if !cancellation {
                            tracing::error!("{} failed; cancelling remaining builds", request.label());
                        }
                        first_is_cancellation = cancellation;
                        first_error = Some(PipelineError::exec(
                            request.product.as_str(),
                            Phase::Build,
                            err,
                        ));
                    }
                }
                Err(join_error) => {
                    token.cancel();
                    if first_error.is_none() || first_is_cancellation {
                        first_is_cancellation = false;
                        first_error = Some(PipelineError::Worker(join_error.to_string()));
                    }
                }
            }
        }
        pb.finish_and_clear();

        match first_error {
            Some(err) => Err(err),
            None => Ok(built),
        }
    }

    /// Produce stale dist outputs, one product at a time in order
    async fn dist_phase(
        &self,
        ordered: &[&WorkItem],
        config_mod_time: Option<SystemTime>,
        opts: &RunOptions,
    ) -> Result<Vec<String>, PipelineError> {
        let mut disted = Vec::new();
        for item in ordered {
            if item.product.dist_ids().is_empty() {
                continue;
            }
            let stale = if opts.force {
                Some((*item).clone())
            } else {
                staleness::requires_dist(&self.layout, item, config_mod_time)?
            };
            let Some(stale) = stale else {
                tracing::info!("Dist outputs of '{}' are up to date", item.id());
                continue;
            };

            for dist_id in stale.product.dist_ids() {
                let request = self.dist_request(&stale, &dist_id)?;
                tracing::info!("Running {}", request.label());
                let output = self
                    .guarded(self.executor.dist(&request))
                    .await
                    .map_err(|e| PipelineError::exec(request.product.as_str(), Phase::Dist, e))?;
                self.sink.emit(&request.label(), &output);
                disted.push(format!("{}.{}", request.product, request.dist_id));
            }
        }
        Ok(disted)
    }

    fn dist_request(&self, item: &WorkItem, dist_id: &DistId) -> Result<DistRequest, PipelineError> {
        let product = &item.product;
        let dister = product
            .dist
            .as_ref()
            .and_then(|d| d.disters.get(dist_id))
            .ok_or_else(|| {
                PipelineError::exec(
                    product.id.as_str(),
                    Phase::Dist,
                    ExecError::Io {
                        path: self.layout.dist_dir(&product.id, dist_id),
                        error: format!("dist '{dist_id}' is not declared"),
                    },
                )
            })?;
        let work_dir = self
            .layout
            .dist_work_dir(product, dist_id)
            .unwrap_or_else(|| self.layout.dist_dir(&product.id, dist_id));

        Ok(DistRequest {
            product: product.id.clone(),
            dist_id: dist_id.clone(),
            script: dister.script.clone(),
            work_dir,
            artifacts: self.layout.dist_artifacts(product, dist_id),
            working_dir: self.layout.project_dir().to_path_buf(),
            env: ScriptEnvironment::for_dist(&self.layout, item, dist_id).into_env_map(),
        })
    }

    /// Build every declared image, one product at a time in order
    async fn docker_phase(&self, ordered: &[&WorkItem]) -> Result<Vec<String>, PipelineError> {
        let mut images = Vec::new();
        for item in ordered {
            for docker_id in item.product.docker_ids() {
                let Some(request) = self.docker_request(item, &docker_id) else {
                    continue;
                };
                tracing::info!("Running {}", request.label());
                let output = self
                    .guarded(self.executor.docker(&request))
                    .await
                    .map_err(|e| PipelineError::exec(request.product.as_str(), Phase::Docker, e))?;
                self.sink.emit(&request.label(), &output);
                images.push(format!("{}.{}", request.product, request.docker_id));
            }
        }
        Ok(images)
    }

    fn docker_request(&self, item: &WorkItem, docker_id: &DockerId) -> Option<DockerRequest> {
        let product = &item.product;
        let builder = product.docker.as_ref()?.builders.get(docker_id)?;
        let context_dir = self.layout.docker_context_dir(product, docker_id)?;

        let inputs = std::iter::once(product)
            .chain(item.all_dependencies.values())
            .flat_map(|p| {
                p.dist_ids().into_iter().map(move |dist_id| ContextInput {
                    product: p.id.clone(),
                    artifacts: self.layout.dist_artifacts(p, &dist_id),
                    dist_id,
                })
            })
            .collect();

        Some(DockerRequest {
            product: product.id.clone(),
            docker_id: docker_id.clone(),
            script: builder.script.clone(),
            context_dir,
            dockerfile: builder.dockerfile.clone(),
            tags: self.layout.docker_tags(product, docker_id),
            inputs,
            working_dir: self.layout.project_dir().to_path_buf(),
            env: ScriptEnvironment::for_docker(&self.layout, product, docker_id).into_env_map(),
        })
    }
}
