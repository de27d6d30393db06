//! Models command - inspect registered models and artifact status.

use clap::{Args, Subcommand};
use console::style;

use cxr_core::{ModelRegistry, OrtBackend};

use super::load_config;

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List registered models and whether their artifact is on disk
    List,
}

pub fn run(args: ModelsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::List => list_models(config_path),
    }
}

fn list_models(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let registry = ModelRegistry::<OrtBackend>::with_deployed_models(&config.models);

    let available = registry.available_models();

    println!("{}", style("Registered Models").bold());
    println!();

    for descriptor in registry.descriptors() {
        let is_available = available.iter().any(|m| m.id == descriptor.id);
        let marker = if is_available {
            style("✓").green()
        } else {
            style("✗").red()
        };
        let is_default = descriptor.id == config.models.default_model;
        let default_marker = if is_default { " (default)" } else { "" };

        println!(
            "{} {} {}{}",
            marker,
            style(&descriptor.id).bold().cyan(),
            descriptor.display_name,
            style(default_marker).dim()
        );

        for path in &descriptor.candidate_paths {
            let status = if path.exists() {
                style("present").green()
            } else {
                style("missing").dim()
            };
            println!("    {:<40} {}", path.display().to_string(), status);
        }
        println!();
    }

    if available.is_empty() {
        println!(
            "{} No model artifacts found; analyses will return placeholder results.",
            style("⚠").yellow()
        );
    }

    Ok(())
}
