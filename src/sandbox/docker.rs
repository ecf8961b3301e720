use anyhow::{Context, Result};
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, ListContainersOptions, LogOutput,
    RemoveContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{ExecInspectResponse, ImageInspect};
use bollard::service::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ExecutionOutput, Sandbox, SandboxError, SessionHandle, SENTINEL_EXIT_CODE};
use crate::config::{parse_memory_limit, SandboxConfig};

/// Label put on every container this tool creates.
const MANAGED_LABEL: &str = "codeloop.managed";

/// Keeps the container alive between command injections.
const IDLE_COMMAND: [&str; 3] = ["tail", "-f", "/dev/null"];

/// Inspections of a finished exec before its exit code counts as missing.
const EXIT_CODE_POLLS: u32 = 10;

const EXIT_CODE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Seconds before a fallback connection attempt gives up.
const FALLBACK_CONNECT_TIMEOUT: u64 = 120;

/// Fixed isolation settings shared by every session of one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SandboxPolicy {
    pub image: String,
    pub memory_bytes: i64,
    pub working_dir: String,
    pub script_name: String,
    /// Interpreter invocation, script name last.
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl SandboxPolicy {
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let memory_bytes = parse_memory_limit(&config.memory)
            .with_context(|| format!("Invalid sandbox memory limit: {}", config.memory))?;

        let script_name = config.script_name.trim().to_string();
        if script_name.is_empty() || script_name.contains('/') {
            anyhow::bail!("Invalid sandbox script name: '{}'", config.script_name);
        }

        let mut command = shell_words::split(&config.interpreter)
            .with_context(|| format!("Failed to parse interpreter: {}", config.interpreter))?;
        if command.is_empty() {
            anyhow::bail!("Sandbox interpreter cannot be empty");
        }
        command.push(script_name.clone());

        if config.timeout_secs == 0 {
            anyhow::bail!("Sandbox timeout_secs must be at least 1");
        }

        Ok(Self {
            image: config.image.clone(),
            memory_bytes,
            working_dir: config.working_dir.clone(),
            script_name,
            command,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Container settings: no network, capped memory, idle keepalive.
    fn container_config(&self) -> ContainerConfig<String> {
        ContainerConfig {
            image: Some(self.image.clone()),
            cmd: Some(IDLE_COMMAND.iter().map(ToString::to_string).collect()),
            working_dir: Some(self.working_dir.clone()),
            network_disabled: Some(true),
            labels: Some(HashMap::from([(
                MANAGED_LABEL.to_string(),
                "true".to_string(),
            )])),
            host_config: Some(HostConfig {
                memory: Some(self.memory_bytes),
                memory_swap: Some(self.memory_bytes),
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Runs candidate programs in throwaway Docker containers.
///
/// One runtime connection per instance; one container per session.
pub(crate) struct DockerSandbox {
    docker: Docker,
    policy: SandboxPolicy,
}

impl DockerSandbox {
    /// Connects to the local Docker daemon.
    ///
    /// Tries the standard local defaults first, then one platform-specific
    /// fallback. Both failing is a `RuntimeUnreachable` error.
    pub async fn connect(policy: SandboxPolicy) -> Result<Self, SandboxError> {
        let docker = match connect_primary().await {
            Ok(docker) => docker,
            Err(primary) => {
                warn!("Standard Docker connection failed: {}", primary);
                info!("Attempting platform-specific Docker connection...");
                let docker = connect_fallback().await.map_err(|fallback| {
                    SandboxError::runtime_unreachable(format!(
                        "{primary}; fallback: {fallback}. Is Docker running?"
                    ))
                })?;
                info!("Connected to Docker via fallback socket");
                docker
            }
        };

        Ok(Self { docker, policy })
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Returns image details, or `None` if the image is not present locally.
    pub async fn inspect_image(&self) -> Result<Option<ImageInspect>, SandboxError> {
        match self.docker.inspect_image(&self.policy.image).await {
            Ok(image) => Ok(Some(image)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(SandboxError::launch(format!(
                "Failed to inspect image {}: {e}",
                self.policy.image
            ))),
        }
    }

    /// Pulls the image unless it is already present (or `force` is set).
    ///
    /// `progress` receives each status line reported by the daemon.
    pub async fn ensure_image<F>(&self, force: bool, mut progress: F) -> Result<(), SandboxError>
    where
        F: FnMut(&str) + Send,
    {
        if !force && self.inspect_image().await?.is_some() {
            debug!("Image {} present locally", self.policy.image);
            return Ok(());
        }

        info!("Pulling Docker image {}...", self.policy.image);

        let options = CreateImageOptions {
            from_image: self.policy.image.as_str(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(SandboxError::image_unavailable(&self.policy.image, error));
                    }
                    if let Some(status) = info.status {
                        let trimmed = status.trim();
                        if !trimmed.is_empty() {
                            progress(trimmed);
                        }
                    }
                }
                Err(e) => {
                    return Err(SandboxError::image_unavailable(
                        &self.policy.image,
                        e.to_string(),
                    ));
                }
            }
        }

        info!("Image pulled: {}", self.policy.image);
        Ok(())
    }

    /// Force-removes containers left behind by runs that were killed.
    ///
    /// Only call this when no other run is using the same daemon.
    pub async fn cleanup_orphaned(&self) -> Result<u32, SandboxError> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{MANAGED_LABEL}=true")],
        )]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| SandboxError::launch(format!("Failed to list containers: {e}")))?;

        let mut removed = 0;
        for id in containers.into_iter().filter_map(|c| c.id) {
            match self.remove(&id).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove orphaned container {}: {}", id, e),
            }
        }

        Ok(removed)
    }

    async fn remove(&self, id: &str) -> Result<(), SandboxError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| SandboxError::teardown(e.to_string()))
    }

    async fn try_execute(
        &self,
        handle: &SessionHandle,
        code: &str,
    ) -> Result<ExecutionOutput, SandboxError> {
        let archive = build_archive(&self.policy.script_name, code)
            .map_err(|e| SandboxError::execution(format!("Failed to package script: {e}")))?;

        self.docker
            .upload_to_container(
                handle.container_id(),
                Some(UploadToContainerOptions {
                    path: self.policy.working_dir.clone(),
                    ..Default::default()
                }),
                Bytes::from(archive),
            )
            .await
            .map_err(|e| SandboxError::execution(format!("Failed to inject script: {e}")))?;

        let exec = self
            .docker
            .create_exec(
                handle.container_id(),
                CreateExecOptions {
                    cmd: Some(self.policy.command.clone()),
                    working_dir: Some(self.policy.working_dir.clone()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::execution(format!("Failed to create exec: {e}")))?;

        let mut output = String::new();

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::execution(format!("Failed to start exec: {e}")))?
        {
            StartExecResults::Attached {
                output: mut stream, ..
            } => {
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(
                            LogOutput::StdOut { message }
                            | LogOutput::StdErr { message }
                            | LogOutput::Console { message },
                        ) => {
                            output.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdIn { .. }) => {}
                        Err(e) => {
                            return Err(SandboxError::execution(format!(
                                "Error reading exec output: {e}"
                            )));
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::execution("Exec started detached"));
            }
        }

        let docker = &self.docker;
        let exec_id = exec.id.as_str();
        let exit_code = settle_exit_code(|| async move {
            docker
                .inspect_exec(exec_id)
                .await
                .map_err(|e| SandboxError::execution(format!("Failed to inspect exec: {e}")))
        })
        .await?;
        debug!("Exec finished with exit code {}", exit_code);

        Ok(ExecutionOutput { exit_code, output })
    }
}

#[async_trait::async_trait]
impl Sandbox for DockerSandbox {
    async fn provision(&self) -> Result<SessionHandle, SandboxError> {
        self.ensure_image(false, |status| debug!("pull: {}", status))
            .await?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("codeloop-{}", &id[..8]);

        debug!("Creating container: {}", name);
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                self.policy.container_config(),
            )
            .await
            .map_err(|e| SandboxError::launch(format!("Failed to create container: {e}")))?;

        debug!("Starting container");
        if let Err(e) = self
            .docker
            .start_container::<String>(&created.id, None)
            .await
        {
            // Created but never started; remove it here since no handle escapes
            if let Err(remove_err) = self.remove(&created.id).await {
                warn!("Failed to remove unstarted container {}: {}", name, remove_err);
            }
            return Err(SandboxError::launch(format!(
                "Failed to start container: {e}"
            )));
        }

        info!(event = "sandbox_provisioned", container = %name, image = %self.policy.image);
        Ok(SessionHandle::new(created.id, self.policy.image.clone()))
    }

    /// Never returns `Err`: failures become a sentinel result.
    async fn execute(
        &self,
        handle: &SessionHandle,
        code: &str,
    ) -> Result<ExecutionOutput, SandboxError> {
        match tokio::time::timeout(self.policy.timeout, self.try_execute(handle, code)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                warn!("Execution in {} failed: {}", handle.container_id(), e);
                Ok(ExecutionOutput::sentinel(format!(
                    "Sandbox Execution Failed: {e}"
                )))
            }
            Err(_) => {
                let err = SandboxError::timeout(self.policy.timeout);
                warn!("Execution in {} stopped: {}", handle.container_id(), err);
                Ok(ExecutionOutput::sentinel(err.to_string()))
            }
        }
    }

    async fn teardown(&self, handle: SessionHandle) -> Result<(), SandboxError> {
        debug!("Removing container {}", handle.container_id());
        self.remove(handle.container_id()).await
    }
}

/// Reads the exit code of a finished exec.
///
/// The daemon can still report `running` for a moment after the output
/// stream closes, so re-inspect a few times before giving up on the code.
async fn settle_exit_code<F, Fut>(mut inspect: F) -> Result<i64, SandboxError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExecInspectResponse, SandboxError>>,
{
    for poll in 1..=EXIT_CODE_POLLS {
        let response = inspect().await?;
        if let Some(code) = response.exit_code {
            return Ok(code);
        }
        if response.running != Some(true) {
            break;
        }
        if poll < EXIT_CODE_POLLS {
            tokio::time::sleep(EXIT_CODE_POLL_INTERVAL).await;
        }
    }

    warn!("Exec reported no exit code");
    Ok(SENTINEL_EXIT_CODE)
}

/// Packs `code` as a single file into an in-memory tar archive.
fn build_archive(file_name: &str, code: &str) -> std::io::Result<Vec<u8>> {
    let data = code.as_bytes();

    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0));

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, file_name, data)?;
    builder.into_inner()
}

async fn connect_primary() -> Result<Docker, String> {
    let docker = Docker::connect_with_local_defaults().map_err(|e| e.to_string())?;
    docker.ping().await.map_err(|e| e.to_string())?;
    Ok(docker)
}

#[cfg(windows)]
async fn connect_fallback() -> Result<Docker, String> {
    let docker = Docker::connect_with_named_pipe(
        r"npipe:////./pipe/docker_engine",
        FALLBACK_CONNECT_TIMEOUT,
        bollard::API_DEFAULT_VERSION,
    )
    .map_err(|e| e.to_string())?;
    docker.ping().await.map_err(|e| e.to_string())?;
    Ok(docker)
}

/// Docker Desktop puts its socket in the user's home rather than /var/run.
#[cfg(unix)]
async fn connect_fallback() -> Result<Docker, String> {
    let home = dirs::home_dir().ok_or("Could not determine home directory")?;
    let socket = home.join(".docker").join("run").join("docker.sock");
    let socket = socket.to_str().ok_or("Invalid socket path")?;

    let docker = Docker::connect_with_unix(
        socket,
        FALLBACK_CONNECT_TIMEOUT,
        bollard::API_DEFAULT_VERSION,
    )
    .map_err(|e| e.to_string())?;
    docker.ping().await.map_err(|e| e.to_string())?;
    Ok(docker)
}
