//! Anistream CLI - Headless Playback Toolkit
//!
//! Features:
//! - Subtitle file inspection and cue lookup
//! - External subtitle search
//! - HLS manifest probing
//! - Stream descriptor planning
//! - Preference management
//! - Scripted playback simulation

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod host;
mod output;

/// Anistream CLI - Episode playback toolkit
#[derive(Parser)]
#[command(name = "anistream")]
#[command(author = "Anistream Developers")]
#[command(version)]
#[command(about = "Headless playback, subtitle and manifest toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Player configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a subtitle file (WebVTT or SRT)
    Subs {
        /// Path to the subtitle file
        file: PathBuf,

        /// Show only the cue active at this time (seconds)
        #[arg(long)]
        at: Option<f64>,
    },

    /// Search the external subtitle service
    Search {
        /// Series title
        title: String,

        /// Episode number
        #[arg(short, long)]
        episode: u32,

        /// Languages to search for (repeatable)
        #[arg(short, long = "lang")]
        languages: Vec<String>,

        /// Only return this language
        #[arg(long)]
        filter: Option<String>,

        /// Resolve the best match to a download URL
        #[arg(long)]
        resolve: bool,
    },

    /// List the quality levels of an HLS manifest
    Probe {
        /// Manifest URL
        url: String,

        /// Referer the upstream host expects
        #[arg(short, long)]
        referer: Option<String>,
    },

    /// Show how a stream descriptor would be played
    Plan {
        /// Path to the descriptor (JSON)
        descriptor: PathBuf,
    },

    /// Show or change stored player preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// List subtitle style presets
    Presets,

    /// Drive a playback session against a headless host
    Simulate {
        /// Path to the descriptor (JSON)
        descriptor: PathBuf,

        /// Episode identifier
        #[arg(short, long, default_value = "episode-1")]
        episode: String,

        /// Episode duration in seconds
        #[arg(short, long, default_value = "1440")]
        duration: f64,

        /// Saved offset to resume from
        #[arg(long)]
        resume: Option<f64>,

        /// Fragment parsing errors to inject after the first minute
        #[arg(long, default_value = "0")]
        frag_errors: u32,

        /// Seconds between simulated time updates
        #[arg(long, default_value = "30")]
        step: f64,

        /// Take quality levels from the real manifest
        #[arg(long)]
        probe: bool,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print stored preferences
    Show,

    /// Update stored preferences
    Set {
        /// Volume (0.0 - 1.0)
        #[arg(long)]
        volume: Option<f64>,

        /// Mute state
        #[arg(long)]
        muted: Option<bool>,

        /// Subtitle style preset id
        #[arg(long)]
        preset: Option<String>,

        /// Preferred subtitle label
        #[arg(long)]
        subtitle: Option<String>,
    },

    /// Print the preferences file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    anistream_core::init();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Subs { file, at } => {
            commands::subs(&file, at, &cli.format)?;
        }
        Commands::Search { title, episode, languages, filter, resolve } => {
            commands::search(&config, &title, episode, languages, filter, resolve, &cli.format).await?;
        }
        Commands::Probe { url, referer } => {
            commands::probe(&config, &url, referer, &cli.format).await?;
        }
        Commands::Plan { descriptor } => {
            commands::plan(&descriptor, &cli.format)?;
        }
        Commands::Prefs { action } => match action {
            PrefsAction::Show => commands::prefs_show(&cli.format)?,
            PrefsAction::Set { volume, muted, preset, subtitle } => {
                commands::prefs_set(volume, muted, preset, subtitle, &cli.format)?;
            }
            PrefsAction::Path => commands::prefs_path()?,
        },
        Commands::Presets => {
            commands::presets(&cli.format);
        }
        Commands::Simulate { descriptor, episode, duration, resume, frag_errors, step, probe } => {
            let script = commands::Script {
                episode,
                duration,
                resume,
                frag_errors,
                step,
                probe,
            };
            commands::simulate(config, &descriptor, script, &cli.format).await?;
        }
    }

    Ok(())
}
