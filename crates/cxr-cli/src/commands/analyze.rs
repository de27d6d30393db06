//! Analyze command - run the pipeline on a single radiograph.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::info;

use cxr_core::Analyzer;

use super::load_config;

/// Arguments for the analyze command.
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input image (PNG or JPEG)
    #[arg(required = true)]
    input: PathBuf,

    /// Model id to use (default model when omitted)
    #[arg(short, long)]
    model: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON record
    #[arg(long)]
    pretty: bool,
}

pub async fn run(args: AnalyzeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Analyzing: {}", args.input.display());

    let analyzer = Analyzer::new(&config);
    let record = analyzer.analyze(&args.input, args.model.as_deref()).await?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &json)?;
        println!(
            "{} Record written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", json);
    }

    eprintln!(
        "{} {} ({:.1}%) in {}ms{}",
        style("✓").green(),
        style(&record.predicted_class_en).bold(),
        record.confidence * 100.0,
        start.elapsed().as_millis(),
        if record.heatmap.is_some() {
            ""
        } else {
            " (no heatmap)"
        }
    );

    Ok(())
}
