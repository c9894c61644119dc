//! Entry point for one Stash hook invocation.
//!
//! [`run`] never fails: every problem is logged and reported through
//! [`HookStatus`] so the plugin process always exits cleanly.

use crate::arr::WhisparrClient;
use crate::bridge::{SceneOutcome, SceneReconciler};
use crate::config::{self, BridgeConfig, LogConfig};
use crate::logging;
use crate::stash::{HookInput, MediaLibrary, StashClient};
use std::path::PathBuf;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

#[derive(Debug, Clone, Default)]
pub struct HookOptions {
    pub config_path: PathBuf,
    /// Overrides the scene id from the hook context
    pub scene_id: Option<String>,
    pub verbose: bool,
    /// Skip Stash plugin settings and log in plain format
    pub dev: bool,
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookStatus {
    NoInput,
    InvalidInput(String),
    ConfigFailed(String),
    NoSceneId,
    SceneNotFound(String),
    Ignored { tag: String },
    Failed(String),
    Finished(SceneOutcome),
}

/// Handle the raw stdin payload of a hook.
pub async fn run(raw_input: &str, options: &HookOptions) -> HookStatus {
    let bootstrap = logging::build_dispatch(&LogConfig::default(), None, options.verbose, !options.dev)
        .unwrap_or_else(|_| Dispatch::none());

    let prepared = prepare(raw_input, options).with_subscriber(bootstrap).await;
    let (input, config, scene_id) = match prepared {
        Ok(prepared) => prepared,
        Err(status) => return status,
    };

    let stash_format = !(options.dev || config.dev_mode);
    let dispatch = logging::build_dispatch(&config.logging, Some(&scene_id), options.verbose, stash_format)
        .unwrap_or_else(|e| {
            eprintln!("logging initialization failed: {}", e);
            Dispatch::none()
        });

    process(input, config, scene_id).with_subscriber(dispatch).await
}

/// Parse input, load configuration and settle on a scene id.
async fn prepare(
    raw_input: &str,
    options: &HookOptions,
) -> Result<(HookInput, BridgeConfig, String), HookStatus> {
    if raw_input.trim().is_empty() {
        tracing::info!("No input data received from Stash hook.");
        return Err(HookStatus::NoInput);
    }

    let input: HookInput = serde_json::from_str(raw_input).map_err(|e| {
        tracing::error!("Failed to parse input JSON: {}", e);
        HookStatus::InvalidInput(e.to_string())
    })?;

    let Some(ref connection) = input.server_connection else {
        tracing::error!("Missing 'server_connection' in Stash data.");
        return Err(HookStatus::InvalidInput("missing server_connection".to_string()));
    };
    let stash = StashClient::new(connection);

    let library: Option<&dyn MediaLibrary> = if options.dev { None } else { Some(&stash) };
    let config = config::load_merged_config(&options.config_path, library)
        .await
        .map_err(|e| {
            tracing::error!("Configuration loading failed: {:#}", e);
            HookStatus::ConfigFailed(format!("{:#}", e))
        })?;

    let scene_id = options
        .scene_id
        .clone()
        .or_else(|| input.scene_id().map(str::to_string));
    let Some(scene_id) = scene_id else {
        tracing::info!("No scene ID provided by hook; exiting.");
        return Err(HookStatus::NoSceneId);
    };

    Ok((input, config, scene_id))
}

async fn process(input: HookInput, config: BridgeConfig, scene_id: String) -> HookStatus {
    let Some(connection) = input.server_connection else {
        return HookStatus::InvalidInput("missing server_connection".to_string());
    };
    let stash = StashClient::new(&connection);

    let item = match stash.find_scene(&scene_id).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            tracing::error!("Scene {} not found in Stash.", scene_id);
            return HookStatus::SceneNotFound(scene_id);
        }
        Err(e) => {
            tracing::error!("Unexpected error fetching scene {}: {}", scene_id, e);
            return HookStatus::Failed(e.to_string());
        }
    };

    tracing::info!("Processing scene: {}", item.title);

    if let Some(tag) = config.ignored_tag(&item.tags) {
        tracing::info!("Scene '{}' skipped due to ignored tag: {}", item.title, tag);
        return HookStatus::Ignored {
            tag: tag.to_string(),
        };
    }

    let whisparr = WhisparrClient::new(&config);
    let reconciler = SceneReconciler::new(&whisparr, &config);

    match reconciler.process_scene(&item).await {
        Ok(outcome) => {
            if let SceneOutcome::Completed(ref report) = outcome {
                tracing::info!(
                    imported = report.imported,
                    already_imported = report.already_imported,
                    missing = report.missing,
                    failed = report.failed,
                    "Scene processing completed"
                );
            }
            HookStatus::Finished(outcome)
        }
        Err(e) => {
            tracing::error!("Whisparr processing error for '{}': {}", item.title, e);
            HookStatus::Failed(e.to_string())
        }
    }
}
