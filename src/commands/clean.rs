//! Remove sandbox containers left behind by killed runs.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::sandbox::{DockerSandbox, SandboxPolicy};

/// Force-removes every container labelled as ours.
///
/// Live sessions of concurrent runs are removed too, so this is an explicit
/// operator command rather than something `solve` does on startup.
pub(crate) async fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;

    let policy = SandboxPolicy::from_config(&config.sandbox)?;
    let sandbox = DockerSandbox::connect(policy).await?;

    let removed = sandbox.cleanup_orphaned().await?;
    println!("{}", format_removed(removed));

    Ok(())
}

fn format_removed(removed: u32) -> String {
    match removed {
        0 => format!("{} No leftover sandbox containers.", "✓".green()),
        1 => format!("{} Removed 1 sandbox container.", "✓".green()),
        n => format!("{} Removed {} sandbox containers.", "✓".green(), n),
    }
}
