mod types;

pub use types::*;

use crate::logging::FileRotation;
use crate::stash::MediaLibrary;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Plugin id the Stash UI stores our settings under
pub const PLUGIN_ID: &str = "whisparr-bridge";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Read a TOML file into a settings table. A missing file yields an empty table.
pub fn load_file_settings(path: &Path) -> Result<Map<String, Value>> {
    if !path.is_file() {
        tracing::info!("Config file {} not found.", path.display());
        return Ok(Map::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    tracing::info!("Configuration loaded from {}", path.display());

    match serde_json::to_value(table)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Layer `overlay` over `base`, key by key. Later sources win.
pub fn merge_settings(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key, value);
    }
}

/// Deserialize and validate a merged settings table.
pub fn from_settings(settings: Map<String, Value>) -> Result<BridgeConfig> {
    let config: BridgeConfig = serde_json::from_value(Value::Object(settings))
        .context("Configuration validation failed")?;

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a TOML file only
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    from_settings(load_file_settings(path)?)
}

/// Load the TOML file, then layer the Stash plugin settings on top.
///
/// Plugin settings are skipped when `library` is `None` or the file enables
/// `DEV_MODE`. Failing to fetch them is logged and the file values are used.
pub async fn load_merged_config(
    path: &Path,
    library: Option<&dyn MediaLibrary>,
) -> Result<BridgeConfig> {
    let mut settings = load_file_settings(path)?;

    let dev_mode = settings
        .get("DEV_MODE")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if let (Some(library), false) = (library, dev_mode) {
        match library.plugin_settings(PLUGIN_ID).await {
            Ok(plugin) => {
                tracing::debug!("Settings from Stash UI: {} keys", plugin.len());
                merge_settings(&mut settings, plugin);
            }
            Err(e) => {
                tracing::error!("Failed to load Stash plugin settings: {}", e);
            }
        }
    }

    from_settings(settings)
}

fn validate_config(config: &BridgeConfig) -> Result<()> {
    if !config.whisparr_url.starts_with("http://") && !config.whisparr_url.starts_with("https://") {
        anyhow::bail!(
            "WHISPARR_URL must be an http(s) URL, got '{}'",
            config.whisparr_url
        );
    }

    // room for the "..." prefix of truncated paths
    if config.max_path_length < 4 {
        anyhow::bail!("MAX_PATH_LENGTH must be at least 4");
    }

    if config.logging.log_file_enable {
        FileRotation::from_config(&config.logging)?;
    }

    Ok(())
}
