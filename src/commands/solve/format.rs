//! Formatting for `solve` output.
//!
//! Pure functions returning strings; printing happens in the caller.

use chrono::Duration;
use colored::Colorize;
use std::fmt::Write;

use crate::extract::Confidence;
use crate::state::{RunState, RunStatus};

/// Lines of generated code shown per attempt before eliding.
const CODE_PREVIEW_LINES: usize = 12;

#[derive(Debug, Clone)]
pub(crate) struct BannerInfo {
    pub task: String,
    pub provider: String,
    pub models: Vec<String>,
    pub image: String,
    pub max_attempts: u32,
}

pub(crate) fn format_duration(duration: &Duration) -> String {
    let total_seconds = duration.num_seconds();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub(crate) fn format_banner(info: &BannerInfo) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\n{}", "━".repeat(50).dimmed());
    let _ = writeln!(out, "{}", "   🚀 codeloop starting".yellow().bold());
    let _ = writeln!(out, "{}", "━".repeat(50).dimmed());

    let _ = writeln!(out, "  Task:       {}", info.task.cyan().bold());
    let _ = writeln!(out, "  Provider:   {}", info.provider.cyan());
    let _ = writeln!(out, "  Models:     {}", info.models.join(" → ").cyan());
    let _ = writeln!(out, "  Image:      {}", info.image.cyan());
    let _ = writeln!(
        out,
        "  Attempts:   {}",
        info.max_attempts.to_string().cyan()
    );

    let _ = writeln!(out, "{}", "━".repeat(50).dimmed());

    out
}

pub(crate) fn format_attempt_header(attempt: u32, max_attempts: u32) -> String {
    format!(
        "\n{} Attempt {}/{} {}",
        "━".repeat(20).dimmed(),
        attempt.to_string().cyan().bold(),
        max_attempts,
        "━".repeat(20).dimmed()
    )
}

/// Shows which model answered and the head of the extracted code.
pub(crate) fn format_generated(model: &str, confidence: Confidence, code: &str) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "🤖 Generated by {}", model.cyan());
    if confidence == Confidence::Raw {
        let _ = writeln!(
            out,
            "  {}",
            "(no code fence found, running the whole answer)".yellow()
        );
    }

    let lines: Vec<&str> = code.lines().collect();
    for line in lines.iter().take(CODE_PREVIEW_LINES) {
        let _ = writeln!(out, "  {}", line.dimmed());
    }
    if lines.len() > CODE_PREVIEW_LINES {
        let _ = writeln!(
            out,
            "  {}",
            format!("... {} more lines", lines.len() - CODE_PREVIEW_LINES).dimmed()
        );
    }

    out
}

/// Shows the outcome of the latest verify step.
pub(crate) fn format_verified(state: &RunState) -> String {
    let entry = state.logs().last().map_or("", String::as_str);

    match state.status() {
        RunStatus::Success => format!("{} {}", "✅".green(), entry),
        _ => format!("{} {}", "❌".red(), entry.red()),
    }
}

pub(crate) fn format_summary(state: &RunState) -> String {
    let mut out = String::new();

    let elapsed = state
        .finished_at()
        .map(|end| end.signed_duration_since(state.started_at()))
        .unwrap_or_else(Duration::zero);

    match state.status() {
        RunStatus::Success => {
            let _ = writeln!(out, "\n{} Task completed successfully.", "🎉".green());
        }
        _ => {
            let _ = writeln!(
                out,
                "\n{} Max attempts reached. Giving up.",
                "🛑".red()
            );
        }
    }

    let _ = writeln!(
        out,
        "  Attempts: {}",
        state.attempts().to_string().cyan()
    );
    let _ = writeln!(out, "  Elapsed:  {}", format_duration(&elapsed).cyan());

    if !state.code().is_empty() {
        let _ = writeln!(out, "\n{}", "Final code:".bold());
        let _ = writeln!(out, "{}", state.code());
    }

    out
}
