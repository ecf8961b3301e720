//! The `solve` command: run one task through the generate/verify loop.
//!
//! - `format`: banner, per-attempt progress and summary rendering

mod format;

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::model::{FallbackInvoker, GeminiClient};
use crate::orchestrator::{LoopEvent, Orchestrator};
use crate::sandbox::{DockerSandbox, SandboxPolicy};
use crate::state::{RunStatus, SolveRequest};

use format::{
    format_attempt_header, format_banner, format_generated, format_summary, format_verified,
    BannerInfo,
};

/// Arguments for one `solve` invocation.
#[derive(Debug, Clone, Default)]
pub(crate) struct SolveArgs {
    pub task: Option<String>,
    /// JSON request file; `-` reads stdin.
    pub request: Option<PathBuf>,
    /// Print the front-door JSON response instead of progress output.
    pub json: bool,
    pub output: Option<PathBuf>,
    pub max_attempts: Option<u32>,
}

/// Runs the loop and returns its final status.
///
/// Setup problems (bad config, missing API key, unreachable Docker) are
/// errors; a run that spends its budget is not.
pub(crate) async fn run(args: SolveArgs) -> Result<RunStatus> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;

    let request = resolve_request(args.task.as_deref(), args.request.as_deref(), || {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read request from stdin")?;
        Ok(input)
    })?;

    // Checked before touching Docker so a missing key fails fast
    let api_key = config.model.api_key()?;
    let client = GeminiClient::new(&config.model, api_key)?;
    let invoker = FallbackInvoker::new(Arc::new(client), &config.model);

    let policy = SandboxPolicy::from_config(&config.sandbox)?;
    let image = policy.image.clone();
    let sandbox = match DockerSandbox::connect(policy).await {
        Ok(sandbox) => sandbox,
        Err(e) if e.is_runtime_unreachable() => {
            return Err(anyhow::Error::new(e)
                .context("Generated code cannot be verified without a container runtime"));
        }
        Err(e) => return Err(e.into()),
    };

    let provider = invoker.provider().to_string();
    let models = invoker.models().to_vec();

    let orchestrator = Orchestrator::new(
        invoker,
        Arc::new(sandbox),
        args.max_attempts.unwrap_or(config.run.max_attempts),
    );

    if !args.json {
        let banner = BannerInfo {
            task: request.task.clone(),
            provider,
            models,
            image,
            max_attempts: orchestrator.max_attempts(),
        };
        print!("{}", format_banner(&banner));
    }

    let quiet = args.json;
    let state = orchestrator
        .run_with(&request.task, |event| {
            if !quiet {
                print_event(&event);
            }
        })
        .await;

    let status = state.status();

    if !args.json {
        print!("{}", format_summary(&state));
    }

    let report = state.into_report();

    if let Some(path) = &args.output {
        report.save(path)?;
        info!("Report written to {}", path.display());
    }

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    }

    Ok(status)
}

fn print_event(event: &LoopEvent<'_>) {
    match event {
        LoopEvent::AttemptStarted {
            attempt,
            max_attempts,
        } => println!("{}", format_attempt_header(*attempt, *max_attempts)),
        LoopEvent::Generated { generation, code } => print!(
            "{}",
            format_generated(&generation.model, generation.confidence, code)
        ),
        LoopEvent::Verified { state } => println!("{}", format_verified(state)),
    }
}

/// Picks the task from the positional argument or a request file.
///
/// Exactly one source must be given. `read_stdin` is only called for `-`.
fn resolve_request<R>(
    task: Option<&str>,
    request: Option<&Path>,
    read_stdin: R,
) -> Result<SolveRequest>
where
    R: FnOnce() -> Result<String>,
{
    match (task, request) {
        (Some(_), Some(_)) => bail!("Pass either a TASK or --request, not both"),
        (None, None) => bail!("No task given.\nUsage: codeloop solve \"<task>\" or codeloop solve --request <file>"),
        (Some(task), None) => {
            if task.trim().is_empty() {
                bail!("Task cannot be empty");
            }
            Ok(SolveRequest {
                task: task.to_string(),
            })
        }
        (None, Some(path)) if path == Path::new("-") => SolveRequest::parse(&read_stdin()?),
        (None, Some(path)) => SolveRequest::load(path),
    }
}
