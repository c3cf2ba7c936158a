//! Splice CLI: command-line interface for timeline export.
//!
//! Usage:
//!   splice export <MANIFEST>     Export a timeline to one video file
//!   splice plan <MANIFEST>       Print the transcoder commands an export would run
//!   splice probe <FILE>          Show media metadata
//!   splice validate <MANIFEST>   Validate a timeline manifest
//!   splice check                 Check for the external media tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use splice_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "splice",
    about = "Trim, join and export video timelines",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a timeline manifest to video
    Export {
        /// Path to the timeline manifest (JSON)
        manifest: PathBuf,

        /// Output file path (defaults to the manifest's output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// ffmpeg binary to use
        #[arg(long)]
        ffmpeg: Option<PathBuf>,

        /// ffprobe binary to use
        #[arg(long)]
        ffprobe: Option<PathBuf>,

        /// Skip probing sources and output
        #[arg(long)]
        no_probe: bool,
    },

    /// Print the transcoder commands an export would run
    Plan {
        /// Path to the timeline manifest (JSON)
        manifest: PathBuf,

        /// Output file path (defaults to the manifest's output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show media metadata
    Probe {
        /// Media file
        file: PathBuf,

        /// ffprobe binary to use
        #[arg(long)]
        ffprobe: Option<PathBuf>,
    },

    /// Validate a timeline manifest
    Validate {
        /// Path to the timeline manifest (JSON)
        manifest: PathBuf,
    },

    /// Check for the external media tools
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    config.logging.json |= cli.json_logs;
    splice_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Export {
            manifest,
            output,
            ffmpeg,
            ffprobe,
            no_probe,
        } => {
            if ffmpeg.is_some() {
                config.tools.ffmpeg = ffmpeg;
            }
            if ffprobe.is_some() {
                config.tools.ffprobe = ffprobe;
            }
            commands::export::run(&config, manifest, output, !no_probe).await
        }
        Commands::Plan {
            manifest,
            output,
            json,
        } => commands::plan::run(&config, manifest, output, json),
        Commands::Probe { file, ffprobe } => {
            if ffprobe.is_some() {
                config.tools.ffprobe = ffprobe;
            }
            commands::probe::run(&config, file).await
        }
        Commands::Validate { manifest } => commands::validate::run(manifest),
        Commands::Check => commands::check::run(&config),
    }
}
