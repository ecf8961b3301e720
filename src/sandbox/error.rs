//! Domain-specific error types for sandbox operations.
//!
//! Typed errors let the loop tell a runtime that is not there at all
//! (fatal at startup) apart from a single session that failed (one bad
//! attempt).

use std::time::Duration;

/// Errors that can occur during sandbox operations.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SandboxError {
    /// Neither the primary nor the fallback runtime connection worked.
    #[error("Container runtime is unreachable: {message}")]
    RuntimeUnreachable { message: String },

    /// The execution image is missing and could not be pulled.
    #[error("Container image unavailable: {image}: {message}")]
    ImageUnavailable { image: String, message: String },

    /// The isolated environment could not be created or started.
    #[error("Docker launch error: {message}")]
    Launch { message: String },

    /// Packaging, injection or command execution failed inside a session.
    #[error("Sandbox execution failed: {message}")]
    Execution { message: String },

    /// Execution exceeded the configured wall-clock limit.
    #[error("Execution timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Force-removal of the environment failed.
    #[error("Container teardown failed: {message}")]
    Teardown { message: String },
}

impl SandboxError {
    /// Creates a `RuntimeUnreachable` error.
    pub fn runtime_unreachable(message: impl Into<String>) -> Self {
        Self::RuntimeUnreachable {
            message: message.into(),
        }
    }

    /// Creates an `ImageUnavailable` error.
    pub fn image_unavailable(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImageUnavailable {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Creates a `Launch` error.
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Creates an `Execution` error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_secs: duration.as_secs(),
        }
    }

    /// Creates a `Teardown` error.
    pub fn teardown(message: impl Into<String>) -> Self {
        Self::Teardown {
            message: message.into(),
        }
    }

    /// Returns true if the runtime itself could not be reached.
    pub fn is_runtime_unreachable(&self) -> bool {
        matches!(self, Self::RuntimeUnreachable { .. })
    }
}
