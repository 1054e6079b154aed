//! Stage executors
//!
//! The orchestrator decides what to produce and in which order; executors
//! produce it. [`ScriptExecutor`] runs the user-declared shell scripts with
//! the phase environment, [`DryRunExecutor`] only reports what would run.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::core::product::{DistId, DockerId, OsArch, ProductId};
use crate::error::ExecError;
use crate::infra::filesystem;

/// Everything needed to compile one product for one target
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Product being built
    pub product: ProductId,
    /// Target
    pub os_arch: OsArch,
    /// Shell script to run
    pub script: String,
    /// Artifact the script must produce
    pub output: PathBuf,
    /// Working directory for the script
    pub working_dir: PathBuf,
    /// Script environment
    pub env: BTreeMap<String, String>,
}

impl BuildRequest {
    /// Human-readable task label
    pub fn label(&self) -> String {
        format!("build {} {}", self.product, self.os_arch)
    }
}

/// Everything needed to produce one dist output
#[derive(Debug, Clone)]
pub struct DistRequest {
    /// Product being packaged
    pub product: ProductId,
    /// Dist output
    pub dist_id: DistId,
    /// Shell script to run
    pub script: String,
    /// Scratch directory, recreated empty before the script runs
    pub work_dir: PathBuf,
    /// Artifacts the script must produce
    pub artifacts: Vec<PathBuf>,
    /// Working directory for the script
    pub working_dir: PathBuf,
    /// Script environment
    pub env: BTreeMap<String, String>,
}

impl DistRequest {
    /// Human-readable task label
    pub fn label(&self) -> String {
        format!("dist {}.{}", self.product, self.dist_id)
    }
}

/// Dist artifacts of one product made available in a docker build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInput {
    /// Producing product
    pub product: ProductId,
    /// Dist output the artifacts belong to
    pub dist_id: DistId,
    /// Artifact paths
    pub artifacts: Vec<PathBuf>,
}

/// Everything needed to build one docker image
#[derive(Debug, Clone)]
pub struct DockerRequest {
    /// Product the image belongs to
    pub product: ProductId,
    /// Image builder
    pub docker_id: DockerId,
    /// Custom script; `None` runs `docker build`
    pub script: Option<String>,
    /// Build context directory
    pub context_dir: PathBuf,
    /// Dockerfile path relative to the context
    pub dockerfile: String,
    /// Rendered tags in declaration order
    pub tags: Vec<String>,
    /// Dist artifacts to link into the context
    pub inputs: Vec<ContextInput>,
    /// Working directory for the script
    pub working_dir: PathBuf,
    /// Script environment
    pub env: BTreeMap<String, String>,
}

impl DockerRequest {
    /// Human-readable task label
    pub fn label(&self) -> String {
        format!("docker {}.{}", self.product, self.docker_id)
    }
}

/// Produces build, dist and docker outputs. Returns the captured output of
/// the work so the caller can flush it in one piece.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Compile one product for one target
    async fn build(&self, request: &BuildRequest) -> Result<String, ExecError>;

    /// Produce one dist output
    async fn dist(&self, request: &DistRequest) -> Result<String, ExecError>;

    /// Build one docker image
    async fn docker(&self, request: &DockerRequest) -> Result<String, ExecError>;
}

/// Runs user-declared scripts through `sh -c`
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    shell: String,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> ExecError {
    ExecError::Io {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

fn verify_artifacts(artifacts: &[PathBuf]) -> Result<(), ExecError> {
    match artifacts.iter().find(|path| !path.exists()) {
        Some(missing) => Err(ExecError::MissingArtifact {
            path: missing.clone(),
        }),
        None => Ok(()),
    }
}

impl ScriptExecutor {
    /// Create an executor using `shell` to interpret scripts
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }

    /// Run a command to completion, returning combined stdout and stderr.
    ///
    /// The child is killed if the returned future is dropped, which is how
    /// cancellation reaches running processes.
    async fn run(
        mut command: Command,
        label: &str,
        working_dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<String, ExecError> {
        command
            .current_dir(working_dir)
            .envs(env)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(command = %label, "Running");
        let output = command.output().await.map_err(|e| ExecError::Spawn {
            command: label.to_string(),
            error: e.to_string(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(ExecError::Failed {
                status: output.status.to_string(),
                output: combined,
            })
        }
    }

    async fn run_script(
        &self,
        script: &str,
        working_dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<String, ExecError> {
        let mut command = Command::new(&self.shell);
        command.arg("-c").arg(script);
        Self::run(command, &format!("{} -c {script}", self.shell), working_dir, env).await
    }

    /// Hard-link every input artifact into
    /// `{context_dir}/{product}/{dist_id}/{file name}`
    fn populate_context(request: &DockerRequest) -> Result<(), ExecError> {
        for input in &request.inputs {
            let target_dir = request
                .context_dir
                .join(input.product.as_str())
                .join(input.dist_id.as_str());
            for artifact in &input.artifacts {
                let Some(file_name) = artifact.file_name() else {
                    continue;
                };
                if !artifact.exists() {
                    return Err(ExecError::MissingArtifact {
                        path: artifact.clone(),
                    });
                }
                let target = target_dir.join(file_name);
                filesystem::link_or_copy(artifact, &target).map_err(|e| io_error(&target, &e))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StageExecutor for ScriptExecutor {
    async fn build(&self, request: &BuildRequest) -> Result<String, ExecError> {
        filesystem::ensure_parent(&request.output).map_err(|e| io_error(&request.output, &e))?;
        let output = self
            .run_script(&request.script, &request.working_dir, &request.env)
            .await?;
        verify_artifacts(std::slice::from_ref(&request.output))?;
        Ok(output)
    }

    async fn dist(&self, request: &DistRequest) -> Result<String, ExecError> {
        filesystem::recreate_dir(&request.work_dir).map_err(|e| io_error(&request.work_dir, &e))?;
        let output = self
            .run_script(&request.script, &request.working_dir, &request.env)
            .await?;
        verify_artifacts(&request.artifacts)?;
        Ok(output)
    }

    async fn docker(&self, request: &DockerRequest) -> Result<String, ExecError> {
        std::fs::create_dir_all(&request.context_dir)
            .map_err(|e| io_error(&request.context_dir, &e))?;
        Self::populate_context(request)?;

        if let Some(script) = &request.script {
            return self
                .run_script(script, &request.working_dir, &request.env)
                .await;
        }

        let mut command = Command::new("docker");
        command
            .arg("build")
            .arg("--file")
            .arg(request.context_dir.join(&request.dockerfile));
        for tag in &request.tags {
            command.arg("--tag").arg(tag);
        }
        command.arg(&request.context_dir);
        let label = format!("docker build {}", request.context_dir.display());
        Self::run(command, &label, &request.working_dir, &request.env).await
    }
}

/// Performs no work; reports what would have run
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl StageExecutor for DryRunExecutor {
    async fn build(&self, request: &BuildRequest) -> Result<String, ExecError> {
        tracing::info!("[dry-run] {}", request.label());
        Ok(format!("[dry-run] would write {}", request.output.display()))
    }

    async fn dist(&self, request: &DistRequest) -> Result<String, ExecError> {
        tracing::info!("[dry-run] {}", request.label());
        Ok(format!(
            "[dry-run] would write {}",
            request
                .artifacts
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    async fn docker(&self, request: &DockerRequest) -> Result<String, ExecError> {
        tracing::info!("[dry-run] {}", request.label());
        Ok(format!("[dry-run] would tag {}", request.tags.join(", ")))
    }
}
