//! rtm-convert - scene-to-runtime-model converter
//!
//! Validates conversion settings and inspects packed `.rtm` models.
//! The conversion pipeline itself is exposed as a library; importer
//! backends plug in through `rtm_convert::SceneImporter`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rtm_convert::settings;

#[derive(Parser)]
#[command(name = "rtm-convert")]
#[command(about = "Scene-to-runtime-model converter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a conversion settings file and its LOD sources
    Check {
        /// Path to a settings .toml
        #[arg(default_value = "convert.toml")]
        settings: PathBuf,
    },

    /// Print a summary of a packed .rtm model
    Info {
        /// Path to a .rtm file
        model: PathBuf,
    },
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

    match cli.command {
        Commands::Check { settings: path } => {
            tracing::info!("Checking settings {:?}", path);
            let settings = settings::load_settings(&path)?;
            let base_dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            settings.resolve_sources(base_dir)?;
            tracing::info!(
                "Settings are valid: {} LOD(s) at {} fps",
                settings.num_lods(),
                settings.frame_rate
            );
        }

        Commands::Info { model } => {
            let bytes = std::fs::read(&model).with_context(|| format!("Failed to read {model:?}"))?;
            let summary = rtm_common::read_model_summary(&bytes)?;
            println!("{}", model.display());
            println!("  materials:  {}", summary.num_materials);
            println!("  joints:     {}", summary.num_joints);
            println!("  actions:    {}", summary.num_actions);
            println!("  submeshes:  {} ({} LODs)", summary.num_submeshes, summary.num_lods);
            println!("  streams:    {}", summary.num_streams);
            println!(
                "  indices:    {}",
                match summary.index_format {
                    rtm_common::IndexFormat::U16 => "16-bit",
                    rtm_common::IndexFormat::U32 => "32-bit",
                }
            );
            if summary.num_joints > 0 {
                println!(
                    "  animation:  {} frames at {} fps",
                    summary.num_frames, summary.frame_rate
                );
            }
        }
    }

    Ok(())
}
