//! Loading of the hardware (TOML) and tag (YAML) documents.
//!
//! ```rust,ignore
//! use mcs_hardware::config::{load_hardware_config, load_tag_document, CommunicationConfig};
//!
//! let hardware = load_hardware_config(Path::new("config/hardware.toml"))?;
//! let tags = load_tag_document(Path::new("config/tags.yaml"))?;
//! let config = CommunicationConfig::new(hardware, tags);
//! ```

use super::schema::HardwareConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde_valid::Validate;
use std::path::Path;
use tracing::{debug, info};

/// Environment prefix for hardware config overrides, e.g. `MCS_PLC__HOST`.
pub const ENV_PREFIX: &str = "MCS_";

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Config validation failed: {0}")]
    ValidationError(String),

    #[error("Schema validation failed:\n{0}")]
    SchemaValidationError(String),
}

fn validate(config: &HardwareConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        let error_messages: Vec<String> =
            errors.to_string().lines().map(|s| s.to_string()).collect();
        return Err(ConfigLoadError::SchemaValidationError(error_messages.join("\n")).into());
    }

    if let Err(errors) = config.check_registers() {
        return Err(ConfigLoadError::ValidationError(errors.join("\n")).into());
    }

    Ok(())
}

/// Load the hardware document from a TOML file, applying `MCS_` environment
/// overrides on top.
pub fn load_hardware_config(path: &Path) -> Result<HardwareConfig> {
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
    }

    debug!("Loading hardware config from: {}", path.display());

    let figment = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: HardwareConfig = figment
        .extract()
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate(&config)?;

    info!(
        "Loaded hardware config: plc={}, feeder={}, force_simulated={}",
        config.plc.as_ref().map(|p| p.host.as_str()).unwrap_or("simulated"),
        config.feeder.as_ref().map(|f| f.host.as_str()).unwrap_or("simulated"),
        config.force_simulated
    );

    Ok(config)
}

/// Load the hardware document from a TOML string. No environment overrides.
pub fn load_hardware_config_from_str(toml_content: &str) -> Result<HardwareConfig> {
    let config: HardwareConfig =
        toml::from_str(toml_content).with_context(|| "Failed to parse TOML content")?;
    validate(&config)?;
    Ok(config)
}

/// Load the tag document from a YAML file.
pub fn load_tag_document(path: &Path) -> Result<serde_yaml::Value> {
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigLoadError::ReadError(format!("{}: {}", path.display(), e)))?;

    let document = parse_tag_document(&content)
        .with_context(|| format!("Failed to parse tag document: {}", path.display()))?;

    debug!("Loaded tag document from: {}", path.display());
    Ok(document)
}

/// Parse a tag document from YAML text.
///
/// Only YAML syntax is checked here; tag-level rules are enforced when the
/// mapping service and cache are built from the document.
pub fn parse_tag_document(content: &str) -> Result<serde_yaml::Value> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;

    match document {
        serde_yaml::Value::Mapping(_) | serde_yaml::Value::Null => Ok(document),
        _ => Err(ConfigLoadError::ValidationError(
            "tag document must be a mapping of tag groups".to_string(),
        )
        .into()),
    }
}
