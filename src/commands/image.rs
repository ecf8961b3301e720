//! Execution image management.
//!
//! The image is pulled inline on first provision anyway; these commands let
//! an operator do it ahead of time and check what is present.

use anyhow::{Context, Result};
use bollard::models::ImageInspect;
use clap::Subcommand;
use std::fmt::Write;

use crate::config::Config;
use crate::sandbox::{DockerSandbox, SandboxPolicy};

#[derive(Subcommand, Debug)]
pub enum ImageAction {
    /// Pull the execution image from its registry
    Pull {
        /// Image name (default: [sandbox].image from codeloop.toml)
        #[arg(long)]
        image: Option<String>,

        /// Pull even if the image exists locally
        #[arg(long)]
        force: bool,
    },

    /// Show whether the execution image is present locally
    Status {
        /// Image name (default: [sandbox].image from codeloop.toml)
        #[arg(long)]
        image: Option<String>,
    },
}

pub async fn run(action: ImageAction) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let mut config = Config::load(&cwd)?;

    match action {
        ImageAction::Pull { image, force } => {
            if let Some(image) = image {
                config.sandbox.image = image;
            }
            let sandbox = connect(&config).await?;
            pull_image(&sandbox, force).await
        }
        ImageAction::Status { image } => {
            if let Some(image) = image {
                config.sandbox.image = image;
            }
            let sandbox = connect(&config).await?;
            show_image_status(&sandbox).await
        }
    }
}

async fn connect(config: &Config) -> Result<DockerSandbox> {
    let policy = SandboxPolicy::from_config(&config.sandbox)?;
    Ok(DockerSandbox::connect(policy).await?)
}

async fn pull_image(sandbox: &DockerSandbox, force: bool) -> Result<()> {
    let image = &sandbox.policy().image;

    if !force && sandbox.inspect_image().await?.is_some() {
        println!("Image '{image}' already exists locally.");
        println!("Use --force to pull anyway.");
        return Ok(());
    }

    sandbox
        .ensure_image(true, |status| println!("{status}"))
        .await?;

    println!("Image pulled: {image}");
    Ok(())
}

async fn show_image_status(sandbox: &DockerSandbox) -> Result<()> {
    let image = &sandbox.policy().image;

    match sandbox.inspect_image().await? {
        Some(details) => print!("{}", format_image_status(image, &details)),
        None => {
            println!("Image not found: {image}");
            println!("\nTo pull the image, run:");
            println!("  codeloop image pull");
        }
    }

    Ok(())
}

fn format_image_status(image: &str, details: &ImageInspect) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Image: {image}");
    let _ = writeln!(out, "Status: Found");

    if let Some(size) = details.size {
        let _ = writeln!(out, "Size: {}", format_size(size));
    }

    if let Some(created) = &details.created {
        let _ = writeln!(out, "Created: {created}");
    }

    if let Some(tags) = details.repo_tags.as_ref().filter(|t| !t.is_empty()) {
        let _ = writeln!(out, "Tags: {}", tags.join(", "));
    }

    if let Some(id) = &details.id {
        let _ = writeln!(out, "ID: {id}");
    }

    out
}

/// Human-readable size in MB or GB.
fn format_size(bytes: i64) -> String {
    // Display only; precision loss is irrelevant at these magnitudes
    #[allow(clippy::cast_precision_loss)]
    let megabytes = bytes.unsigned_abs() as f64 / 1_048_576.0;
    let gigabytes = megabytes / 1024.0;
    if gigabytes >= 1.0 {
        format!("{gigabytes:.2} GB ({megabytes:.2} MB)")
    } else {
        format!("{megabytes:.2} MB")
    }
}
