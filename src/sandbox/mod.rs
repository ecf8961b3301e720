//! Isolated execution of candidate programs.
//!
//! A session is one container that lives for exactly one verification
//! attempt: provision, inject and run the program, capture output, and
//! always tear down. [`run_in_session`] is the only way the loop touches a
//! sandbox, so release happens on every exit path.

mod docker;
mod error;
#[cfg(test)]
pub(crate) mod mock;

pub(crate) use docker::{DockerSandbox, SandboxPolicy};
pub(crate) use error::SandboxError;

use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

/// Exit code reported when the program could not be run at all.
pub(crate) const SENTINEL_EXIT_CODE: i64 = -1;

/// Opaque reference to a provisioned environment.
///
/// Not `Clone`: [`Sandbox::teardown`] consumes it, so a handle is released
/// at most once.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    container_id: String,
    image: String,
}

impl SessionHandle {
    pub fn new(container_id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            image: image.into(),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn image(&self) -> &str {
        &self.image
    }
}

/// Captured result of running a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecutionOutput {
    pub exit_code: i64,
    /// stdout and stderr interleaved in arrival order.
    pub output: String,
}

impl ExecutionOutput {
    pub fn sentinel(message: impl Into<String>) -> Self {
        Self {
            exit_code: SENTINEL_EXIT_CODE,
            output: message.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for isolated execution backends.
#[async_trait]
pub(crate) trait Sandbox: Send + Sync {
    /// Starts a fresh environment ready to accept a program.
    async fn provision(&self) -> Result<SessionHandle, SandboxError>;

    /// Injects `code` into the environment and runs it in the foreground.
    async fn execute(
        &self,
        handle: &SessionHandle,
        code: &str,
    ) -> Result<ExecutionOutput, SandboxError>;

    /// Forcibly removes the environment.
    async fn teardown(&self, handle: SessionHandle) -> Result<(), SandboxError>;
}

/// Result of one scoped session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionOutcome {
    /// The program ran; inspect the exit code.
    Completed(ExecutionOutput),
    /// Provisioning or execution failed before a result was produced.
    Crashed(String),
}

/// Provisions a session, runs `code` in it, and releases it.
///
/// Teardown runs exactly once whenever provisioning succeeded, including
/// when execution returns an error or panics. Teardown failures are logged
/// and dropped: a leaked container must not fail the attempt.
pub(crate) async fn run_in_session(sandbox: &dyn Sandbox, code: &str) -> SessionOutcome {
    let handle = match AssertUnwindSafe(sandbox.provision()).catch_unwind().await {
        Ok(Ok(handle)) => handle,
        Ok(Err(e)) => return SessionOutcome::Crashed(e.to_string()),
        Err(panic) => return SessionOutcome::Crashed(panic_message(panic.as_ref())),
    };
    debug!(
        "Session {} provisioned from {}",
        handle.container_id(),
        handle.image()
    );

    let result = AssertUnwindSafe(sandbox.execute(&handle, code))
        .catch_unwind()
        .await;

    release(sandbox, handle).await;

    match result {
        Ok(Ok(output)) => SessionOutcome::Completed(output),
        Ok(Err(e)) => SessionOutcome::Crashed(e.to_string()),
        Err(panic) => SessionOutcome::Crashed(panic_message(panic.as_ref())),
    }
}

/// Best-effort teardown.
async fn release(sandbox: &dyn Sandbox, handle: SessionHandle) {
    let id = handle.container_id().to_string();
    match AssertUnwindSafe(sandbox.teardown(handle)).catch_unwind().await {
        Ok(Ok(())) => debug!("Session {} removed", id),
        Ok(Err(e)) => warn!("Failed to remove sandbox {}: {}. Continuing anyway.", id, e),
        Err(panic) => warn!(
            "Teardown of sandbox {} panicked: {}. Continuing anyway.",
            id,
            panic_message(panic.as_ref())
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Sandbox panicked: {detail}")
}
