//! Scene reconciliation.
//!
//! A scene moves through `Start -> Lookup -> (Found | Create) -> Files -> Done`.
//! Lookup and create failures abort the scene; each file is handled on its
//! own and a failing file only costs that file.

pub mod files;

use crate::arr::{Command, ManualImportFile, ManualImportPreview, SceneCreate, WhisparrApi, WhisparrScene};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::logging::truncate_path;
use crate::stash::MediaItem;
use files::{ensure_location, PathMapping, Placement};
use std::fmt;
use std::path::{Path, PathBuf};

/// Reconciliation stage, used for logging transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Lookup,
    Found,
    Create,
    Files,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Lookup => "lookup",
            Stage::Found => "found",
            Stage::Create => "create",
            Stage::Files => "files",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tally of what happened to a scene's files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneReport {
    pub record_id: i64,
    pub created: bool,
    pub imported: usize,
    pub already_imported: usize,
    pub missing: usize,
    pub not_in_place: usize,
    pub failed: usize,
    pub renamed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneOutcome {
    /// Nothing to do for this scene
    Skipped { reason: String },
    Completed(SceneReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Imported,
    AlreadyImported,
    NotInPlace,
}

/// Drives one scene through Whisparr
pub struct SceneReconciler<'a> {
    api: &'a dyn WhisparrApi,
    config: &'a BridgeConfig,
}

impl<'a> SceneReconciler<'a> {
    pub fn new(api: &'a dyn WhisparrApi, config: &'a BridgeConfig) -> Self {
        Self { api, config }
    }

    fn enter(&self, stage: Stage, item: &MediaItem) {
        tracing::debug!(stage = %stage, "Scene '{}' entering {}", item.title, stage);
    }

    fn short(&self, path: &Path) -> String {
        truncate_path(path, self.config.max_path_length)
    }

    /// Find or create the Whisparr record for `item` and reconcile its files.
    pub async fn process_scene(&self, item: &MediaItem) -> Result<SceneOutcome> {
        self.enter(Stage::Start, item);

        let Some(stash_id) = item.stashdb_id(&self.config.stashdb_endpoint_substr) else {
            tracing::warn!("No StashDB ID for '{}', skipping", item.title);
            return Ok(SceneOutcome::Skipped {
                reason: "no StashDB id".to_string(),
            });
        };

        self.enter(Stage::Lookup, item);
        let (record, created) = match self.find_existing_scene(item, stash_id).await? {
            Some(record) => {
                self.enter(Stage::Found, item);
                (record, false)
            }
            None => {
                self.enter(Stage::Create, item);
                (self.create_scene(item, stash_id).await?, true)
            }
        };

        self.enter(Stage::Files, item);
        let mut report = self.process_files(item, &record).await;
        report.created = created;

        self.enter(Stage::Done, item);
        Ok(SceneOutcome::Completed(report))
    }

    /// Look the scene up by stash id. More than one match is an error.
    pub async fn find_existing_scene(
        &self,
        item: &MediaItem,
        stash_id: &str,
    ) -> Result<Option<WhisparrScene>> {
        let mut scenes = self.api.find_scenes(stash_id).await?;

        match scenes.len() {
            0 => {
                tracing::info!("No existing scenes found in Whisparr for '{}'", item.title);
                Ok(None)
            }
            1 => {
                let scene = scenes.remove(0);
                tracing::info!("Scene already exists in Whisparr: {}", scene.title);
                Ok(Some(scene))
            }
            n => {
                tracing::error!("Whisparr returned {} scenes for stash id {}", n, stash_id);
                Err(BridgeError::record_not_found(
                    &item.title,
                    format!("{} Whisparr scenes share stash id {}", n, stash_id),
                ))
            }
        }
    }

    /// Add the scene to Whisparr with the configured profile and root folder.
    pub async fn create_scene(&self, item: &MediaItem, stash_id: &str) -> Result<WhisparrScene> {
        let payload = SceneCreate::new(
            &item.title,
            stash_id,
            self.config.monitored,
            self.quality_profile_id().await?,
            self.root_folder_path().await?,
        );

        let scene = self
            .api
            .create_scene(&payload)
            .await
            .map_err(|e| BridgeError::record_not_found(&item.title, format!("create failed: {}", e)))?;

        tracing::info!("Added scene '{}' to Whisparr (id {})", item.title, scene.id);
        Ok(scene)
    }

    /// Id of the configured quality profile, or the first one Whisparr lists.
    pub async fn quality_profile_id(&self) -> Result<i64> {
        let profiles = self.api.quality_profiles().await?;

        if let Some(profile) = profiles
            .iter()
            .find(|p| p.name == self.config.quality_profile)
        {
            return Ok(profile.id);
        }

        let first = profiles.first().ok_or_else(|| BridgeError::RemoteService {
            method: "GET".to_string(),
            url: "/qualityprofile".to_string(),
            status: None,
            body: "no quality profiles configured".to_string(),
            source: None,
        })?;
        tracing::warn!(
            "Quality profile '{}' not found, using '{}'",
            self.config.quality_profile,
            first.name
        );
        Ok(first.id)
    }

    /// Configured root folder if Whisparr has it, else the first one listed.
    pub async fn root_folder_path(&self) -> Result<String> {
        let folders = self.api.root_folders().await?;

        if let Some(ref wanted) = self.config.root_folder {
            let wanted = wanted.to_string_lossy();
            let wanted = wanted.trim_end_matches('/');
            if let Some(folder) = folders
                .iter()
                .find(|f| f.path.trim_end_matches('/') == wanted)
            {
                return Ok(folder.path.clone());
            }
            tracing::warn!("Root folder '{}' not found in Whisparr", wanted);
        }

        folders
            .into_iter()
            .next()
            .map(|f| f.path)
            .ok_or_else(|| BridgeError::RemoteService {
                method: "GET".to_string(),
                url: "/rootfolder".to_string(),
                status: None,
                body: "no root folders configured".to_string(),
                source: None,
            })
    }

    /// Handle every local file of the scene, then queue at most one rename.
    pub async fn process_files(&self, item: &MediaItem, record: &WhisparrScene) -> SceneReport {
        let mut report = SceneReport {
            record_id: record.id,
            ..SceneReport::default()
        };

        for path in &item.paths {
            tracing::info!("Checking Stash file: {}", self.short(path));

            if !path.exists() {
                tracing::warn!("File does not exist: {}", self.short(path));
                report.missing += 1;
                continue;
            }

            match self.process_file(path, record).await {
                Ok(FileOutcome::Imported) => report.imported += 1,
                Ok(FileOutcome::AlreadyImported) => report.already_imported += 1,
                Ok(FileOutcome::NotInPlace) => report.not_in_place += 1,
                Err(e) => {
                    tracing::error!(
                        "Error processing file {} of '{}': {}",
                        self.short(path),
                        item.title,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        if self.config.whisparr_rename && report.imported > 0 {
            match self.queue_rename(record).await {
                Ok(()) => report.renamed = true,
                Err(e) => tracing::error!("Failed to queue rename command: {}", e),
            }
        }

        report
    }

    async fn process_file(&self, path: &Path, record: &WhisparrScene) -> Result<FileOutcome> {
        let placed = match self.ensure_file_location(path, record)? {
            Some(placed) => placed,
            None => return Ok(FileOutcome::NotInPlace),
        };

        match self.matching_preview(&placed, record).await? {
            Some(preview) => {
                self.execute_manual_import(&placed, &preview, record).await?;
                Ok(FileOutcome::Imported)
            }
            None => Ok(FileOutcome::AlreadyImported),
        }
    }

    /// Local path of the file once it sits in the record directory, `None`
    /// when it is elsewhere and may not be moved.
    fn ensure_file_location(&self, path: &Path, record: &WhisparrScene) -> Result<Option<PathBuf>> {
        let remote_dir = record
            .path
            .as_deref()
            .ok_or_else(|| BridgeError::import_failure(path, "Whisparr scene has no path defined"))?;
        let target_dir = PathMapping::new(&self.config.path_mapping).to_local(remote_dir);

        let placement = ensure_location(
            path,
            &target_dir,
            self.config.move_files,
            self.config.max_path_length,
        )?;

        Ok(placement.path().map(Path::to_path_buf))
    }

    async fn matching_preview(
        &self,
        placed: &Path,
        record: &WhisparrScene,
    ) -> Result<Option<ManualImportPreview>> {
        let folder = placed
            .parent()
            .ok_or_else(|| BridgeError::import_failure(placed, "file has no parent directory"))?;
        let remote_folder = PathMapping::new(&self.config.path_mapping).to_remote(folder);

        let previews = self
            .api
            .manual_import_preview(&remote_folder.to_string_lossy(), record.id)
            .await?;

        let matched = previews.into_iter().find(|p| p.matches_file(placed));
        if matched.is_none() {
            tracing::info!("File already imported to Whisparr: {}", self.short(placed));
        }
        Ok(matched)
    }

    async fn execute_manual_import(
        &self,
        placed: &Path,
        preview: &ManualImportPreview,
        record: &WhisparrScene,
    ) -> Result<()> {
        let command = Command::manual_import(ManualImportFile::from_preview(preview, record.id));

        self.api
            .send_command(&command)
            .await
            .map_err(|e| BridgeError::import_failure(placed, format!("manual import rejected: {}", e)))?;

        tracing::info!("Manual import queued for {}", self.short(placed));
        Ok(())
    }

    async fn queue_rename(&self, record: &WhisparrScene) -> Result<()> {
        self.api
            .send_command(&Command::rename(record.id))
            .await
            .map_err(|e| BridgeError::ImportFailure {
                path: format!("scene {}", record.id),
                message: format!("rename rejected: {}", e),
            })?;

        tracing::info!("Rename command queued for scene id {}", record.id);
        Ok(())
    }
}
