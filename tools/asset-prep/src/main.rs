//! asset-prep - texture preprocessing tool
//!
//! Downsizes oversized textures, converts PNG textures to JPEG, updates `.mtl`
//! texture references and optionally deletes the original PNGs.
//!
//! ```bash
//! # Process the current directory
//! asset-prep
//!
//! # Process an asset tree and delete the converted PNGs afterwards
//! asset-prep assets/models --purge
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use asset_prep::{pipeline, PipelineReport, PrepConfig};

#[derive(Parser)]
#[command(name = "asset-prep")]
#[command(about = "Texture preprocessing tool")]
#[command(version)]
struct Cli {
    /// Root folder of the asset tree
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Delete original PNG files after conversion
    #[arg(long)]
    purge: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = PrepConfig::new(cli.root, cli.purge);

    let report = pipeline::run(&config);
    print_summary(&report);

    if report.has_failures() {
        anyhow::bail!(
            "{} file(s) under {} could not be processed",
            report.failed(),
            config.root.display()
        );
    }

    Ok(())
}

fn print_summary(report: &PipelineReport) {
    println!();
    if !report.unreadable.is_empty() {
        println!("Unreadable paths: {}", report.unreadable.len());
    }
    println!("Textures:");
    println!("  Processed: {}", report.normalized.processed());
    println!("  Skipped: {}", report.normalized.skipped());
    println!("  Failed: {}", report.normalized.failed());
    println!("Materials updated: {}", report.materials_rewritten());
    match &report.purged {
        Some(purge) if purge.withheld => println!("PNG purge: withheld"),
        Some(_) => println!("PNG files deleted: {}", report.purged()),
        None => {}
    }
}
