//! `mcs-daemon`: bring the hardware tag layer up from config files.
//!
//! ```bash
//! # Start against the configured hardware, falling back to simulation
//! mcs-daemon run --hardware config/hardware.toml --tags config/tags.yaml
//!
//! # Everything simulated
//! mcs-daemon run --tags config/tags.yaml --simulated
//!
//! # Validate a tag document
//! mcs-daemon check --tags config/tags.yaml
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mcs_core::HealthStatus;
use mcs_hardware::config::{load_hardware_config, load_tag_document};
use mcs_hardware::{
    CommunicationConfig, CommunicationService, HardwareConfig, TagCacheService,
    TagMappingService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[derive(Parser)]
#[command(name = "mcs-daemon")]
#[command(about = "Hardware tag abstraction layer daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the communication service and run until Ctrl-C
    Run {
        /// Hardware connection file (TOML)
        #[arg(long, required_unless_present = "simulated")]
        hardware: Option<PathBuf>,

        /// Tag group document (YAML)
        #[arg(long)]
        tags: PathBuf,

        /// Use simulated clients on both transports
        #[arg(long)]
        simulated: bool,
    },

    /// Build the tag mapping and cache from a document and report sizes
    Check {
        /// Tag group document (YAML)
        #[arg(long)]
        tags: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            hardware,
            tags,
            simulated,
        } => run(hardware, tags, simulated).await,
        Commands::Check { tags } => check(tags),
    }
}

async fn run(hardware: Option<PathBuf>, tags: PathBuf, simulated: bool) -> Result<()> {
    let mut hardware_config = match &hardware {
        Some(path) => load_hardware_config(path)?,
        None => HardwareConfig::default(),
    };
    if simulated {
        hardware_config.force_simulated = true;
    }
    let tag_document = load_tag_document(&tags)?;

    let service = CommunicationService::new();
    service
        .start(&CommunicationConfig::new(hardware_config, tag_document))
        .await
        .context("Failed to start communication service")?;

    let health = service.check_health().await?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    if health.status != HealthStatus::Healthy {
        tracing::warn!("Running {}: {}", health.status, health.error.as_deref().unwrap_or(""));
    }

    info!("Running; press Ctrl-C to stop");
    signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    service.stop().await?;
    Ok(())
}

fn check(tags: PathBuf) -> Result<()> {
    let document = load_tag_document(&tags)?;

    let mapping = Arc::new(TagMappingService::new());
    mapping
        .start(&document)
        .with_context(|| format!("Invalid tag mapping in {}", tags.display()))?;
    let cache = TagCacheService::new(mapping.clone());
    cache
        .start(&document)
        .with_context(|| format!("Invalid tag definitions in {}", tags.display()))?;

    if cache.is_empty() {
        bail!("{} defines no tags", tags.display());
    }

    println!(
        "{}: {} tags, {} mapped ({} native addresses)",
        tags.display(),
        cache.len(),
        mapping.len(),
        mapping
            .mappings()
            .iter()
            .map(|m| m.sources.len())
            .sum::<usize>()
    );
    Ok(())
}
