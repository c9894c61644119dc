use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Scene ("movie") record as returned by Whisparr
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhisparrScene {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "optional_path")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityProfile {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootFolder {
    #[serde(default)]
    pub id: Option<i64>,
    pub path: String,
}

/// One entry of the manual-import preview for a folder
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualImportPreview {
    pub path: PathBuf,
    #[serde(default)]
    pub folder_name: String,
    #[serde(default)]
    pub size: u64,
    /// Quality as Whisparr detected it, passed back verbatim on import
    #[serde(default)]
    pub quality: Option<Value>,
}

impl ManualImportPreview {
    /// Whether this candidate is the local file `path` (compared by file name)
    pub fn matches_file(&self, path: &Path) -> bool {
        match (self.path.file_name(), path.file_name()) {
            (Some(candidate), Some(local)) => candidate == local,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOptions {
    pub monitor: String,
    pub search_for_movie: bool,
}

/// Body of `POST /movie`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneCreate {
    pub title: String,
    pub foreign_id: String,
    pub stash_id: String,
    pub monitored: bool,
    pub quality_profile_id: i64,
    pub root_folder_path: String,
    pub add_options: AddOptions,
}

impl SceneCreate {
    pub fn new(
        title: &str,
        stash_id: &str,
        monitored: bool,
        quality_profile_id: i64,
        root_folder_path: String,
    ) -> Self {
        Self {
            title: title.to_string(),
            foreign_id: stash_id.to_string(),
            stash_id: stash_id.to_string(),
            monitored,
            quality_profile_id,
            root_folder_path,
            add_options: AddOptions {
                monitor: if monitored { "movieOnly" } else { "none" }.to_string(),
                search_for_movie: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Language {
    pub id: i64,
    pub name: String,
}

impl Default for Language {
    fn default() -> Self {
        Self {
            id: 1,
            name: "English".to_string(),
        }
    }
}

/// A file entry of a `ManualImport` command
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualImportFile {
    pub path: String,
    pub movie_id: i64,
    pub folder_name: String,
    pub release_group: String,
    pub languages: Vec<Language>,
    pub indexer_flags: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<Value>,
}

impl ManualImportFile {
    pub fn from_preview(preview: &ManualImportPreview, movie_id: i64) -> Self {
        Self {
            path: preview.path.to_string_lossy().into_owned(),
            movie_id,
            folder_name: preview.folder_name.clone(),
            release_group: String::new(),
            languages: vec![Language::default()],
            indexer_flags: 0,
            quality: preview.quality.clone(),
        }
    }
}

/// Commands queued through `POST /command`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name")]
pub enum Command {
    #[serde(rename = "ManualImport", rename_all = "camelCase")]
    ManualImport {
        files: Vec<ManualImportFile>,
        import_mode: String,
    },

    #[serde(rename = "RenameFiles", rename_all = "camelCase")]
    RenameFiles { movie_ids: Vec<i64> },
}

impl Command {
    pub fn manual_import(file: ManualImportFile) -> Self {
        Command::ManualImport {
            files: vec![file],
            import_mode: "auto".to_string(),
        }
    }

    pub fn rename(movie_id: i64) -> Self {
        Command::RenameFiles {
            movie_ids: vec![movie_id],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::ManualImport { .. } => "ManualImport",
            Command::RenameFiles { .. } => "RenameFiles",
        }
    }
}

/// What Whisparr answers when a command is queued
#[derive(Debug, Clone, Deserialize)]
pub struct CommandStatus {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
}

fn optional_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|p| !p.is_empty()).map(PathBuf::from))
}
