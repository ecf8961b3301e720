use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Where a run currently stands.
///
/// `Error` is only terminal once the attempt budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Start,
    Success,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Mutable record threaded through the generate/verify loop.
///
/// Owned by a single run. Fields are only changed through the methods below
/// so `attempts` and `logs` keep their counting and append-only guarantees.
#[derive(Debug, Clone)]
pub struct RunState {
    task: String,
    code: String,
    logs: Vec<String>,
    attempts: u32,
    status: RunStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            code: String::new(),
            logs: Vec::new(),
            attempts: 0,
            status: RunStatus::Start,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// The most recent failure, if the previous attempt failed.
    pub fn last_failure(&self) -> Option<&str> {
        if self.status == RunStatus::Error {
            self.logs.last().map(String::as_str)
        } else {
            None
        }
    }

    /// Starts a new generate step and returns its 1-based number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub(crate) fn set_code(&mut self, code: String) {
        self.code = code;
    }

    pub(crate) fn record_failure(&mut self, entry: String) {
        self.logs.push(entry);
        self.status = RunStatus::Error;
    }

    pub(crate) fn record_success(&mut self, entry: String) {
        self.logs.push(entry);
        self.status = RunStatus::Success;
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Converts the final state into the front-door response.
    pub fn into_report(self) -> RunReport {
        RunReport {
            code: self.code,
            logs: self.logs,
            attempts: self.attempts,
            status: self.status,
        }
    }
}

/// Request accepted by the task front door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub task: String,
}

impl SolveRequest {
    /// Load a request from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse request file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(content).context("Invalid solve request")?;
        if request.task.trim().is_empty() {
            anyhow::bail!("Solve request has an empty task");
        }
        Ok(request)
    }
}

/// Response returned to the task front door once a run is finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub code: String,
    pub logs: Vec<String>,
    pub attempts: u32,
    pub status: RunStatus,
}

impl RunReport {
    /// Save report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize report")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write report file: {}", path.display()))?;

        Ok(())
    }
}
