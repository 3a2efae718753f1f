//! vidlayer CLI: burn timed overlays into a video.
//!
//! Usage:
//!   vidlayer render <VIDEO> --timeline <FILE>   Submit a render job and wait for it
//!   vidlayer plan <VIDEO> --timeline <FILE>     Print the engine command without running it
//!   vidlayer validate <TIMELINE>                Validate a timeline file
//!   vidlayer check                              Check engine and font availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vidlayer_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "vidlayer",
    about = "Burn text, image, and video overlays into a video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a render job and wait for it to finish
    Render {
        /// Main video
        video: PathBuf,

        /// Timeline JSON file
        #[arg(short, long)]
        timeline: PathBuf,

        /// Asset file, keyed by its file name (repeatable)
        #[arg(short, long = "asset")]
        assets: Vec<PathBuf>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Status poll interval in milliseconds
        #[arg(long, default_value = "250")]
        poll_ms: u64,
    },

    /// Compile a timeline and print the engine command
    Plan {
        /// Main video
        video: PathBuf,

        /// Timeline JSON file
        #[arg(short, long)]
        timeline: PathBuf,

        /// Asset file, keyed by its file name (repeatable)
        #[arg(short, long = "asset")]
        assets: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,

        /// Print the compiled plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a timeline file
    Validate {
        /// Timeline JSON file
        timeline: PathBuf,
    },

    /// Check engine and font availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    vidlayer_common::logging::init_logging(&config.logging);
    tracing::debug!(
        config = ?cli.config,
        output_dir = %config.output_dir.display(),
        engine = %config.engine.binary.display(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Render {
            video,
            timeline,
            assets,
            output_dir,
            poll_ms,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            commands::render::run(&config, video, timeline, assets, poll_ms).await
        }
        Commands::Plan {
            video,
            timeline,
            assets,
            output,
            json,
        } => commands::plan::run(&config, video, timeline, assets, output, json),
        Commands::Validate { timeline } => commands::validate::run(timeline),
        Commands::Check => commands::check::run(&config),
    }
}
