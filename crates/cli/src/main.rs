//! Deepfake Detect CLI
//!
//! Runs the deepfake analysis pipeline on a local video without the HTTP
//! server and prints its report as JSON. Artifacts are given as local paths
//! rather than the server's URLs.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::analyze::AnalyzeCommand;
use commands::probe::ProbeCommand;

#[derive(Parser)]
#[command(
    name = "deepfake-detect",
    version,
    about = "Frame-sampling deepfake analysis for video files",
    after_help = "EXAMPLES:\n  \
                  # Analyse a video and print the JSON report\n  \
                  deepfake-detect analyze clip.mp4\n\n  \
                  # Use a HuggingFace label table and a font for overlays\n  \
                  deepfake-detect analyze --labels config.json --font DejaVuSans.ttf clip.mp4\n\n  \
                  # Show how many frames would be sampled\n  \
                  deepfake-detect probe clip.mp4"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify sampled frames and report anomalies
    Analyze(AnalyzeCommand),

    /// Print frame count and sampling stride
    Probe(ProbeCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // Logs go to stderr so the JSON report on stdout stays parseable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Analyze(cmd) => cmd.execute(),
        Commands::Probe(cmd) => cmd.execute(),
    }
}
