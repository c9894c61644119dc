use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Bridge settings.
///
/// Keys use the upper-case names Stash plugin settings are stored under, so
/// the same table can come from `config.toml` or from the Stash UI.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BridgeConfig {
    #[serde(deserialize_with = "non_empty_trimmed")]
    pub whisparr_url: String,

    #[serde(deserialize_with = "non_empty_trimmed")]
    pub whisparr_key: String,

    /// Substring identifying the StashDB endpoint among a scene's stash ids
    #[serde(default = "default_endpoint_substr")]
    pub stashdb_endpoint_substr: String,

    #[serde(default = "default_true")]
    pub monitored: bool,

    /// Move files into the Whisparr scene directory when they live elsewhere
    #[serde(default)]
    pub move_files: bool,

    /// Queue a rename in Whisparr after files were imported
    #[serde(default = "default_true")]
    pub whisparr_rename: bool,

    #[serde(default = "default_quality_profile")]
    pub quality_profile: String,

    #[serde(default, deserialize_with = "optional_path")]
    pub root_folder: Option<PathBuf>,

    #[serde(default, deserialize_with = "tag_list")]
    pub ignore_tags: Vec<String>,

    /// Skip Stash plugin settings and log in plain format
    #[serde(default)]
    pub dev_mode: bool,

    /// Whisparr-side path prefix -> local path prefix
    #[serde(default)]
    pub path_mapping: BTreeMap<String, String>,

    #[serde(default = "default_max_log_body")]
    pub max_log_body: usize,

    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,

    #[serde(flatten)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub log_console_enable: bool,

    #[serde(default)]
    pub log_file_enable: bool,

    #[serde(default = "default_log_file_level")]
    pub log_file_level: String,

    #[serde(default = "default_log_file_location", deserialize_with = "expanded_path")]
    pub log_file_location: PathBuf,

    /// `SINGLE-FILE`, `ROTATING_SIZE` or `ROTATING_TIME`
    #[serde(default = "default_log_file_type")]
    pub log_file_type: String,

    /// Size threshold for `ROTATING_SIZE`
    #[serde(default = "default_log_file_max_bytes")]
    pub log_file_max_bytes: u64,

    /// Rotated files kept next to the active log
    #[serde(default = "default_log_file_backup_count")]
    pub log_file_backup_count: usize,

    /// Interval for `ROTATING_TIME`: `S`, `M`, `H`, `D`, `midnight` or `W0`-`W6`
    #[serde(default = "default_log_file_rotate_when")]
    pub log_file_rotate_when: String,

    #[serde(default)]
    pub log_file_use_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_console_enable: true,
            log_file_enable: false,
            log_file_level: default_log_file_level(),
            log_file_location: default_log_file_location(),
            log_file_type: default_log_file_type(),
            log_file_max_bytes: default_log_file_max_bytes(),
            log_file_backup_count: default_log_file_backup_count(),
            log_file_rotate_when: default_log_file_rotate_when(),
            log_file_use_color: false,
        }
    }
}

impl BridgeConfig {
    /// Build a config with defaults for everything but the Whisparr connection.
    pub fn new(whisparr_url: impl Into<String>, whisparr_key: impl Into<String>) -> Self {
        Self {
            whisparr_url: whisparr_url.into(),
            whisparr_key: whisparr_key.into(),
            stashdb_endpoint_substr: default_endpoint_substr(),
            monitored: true,
            move_files: false,
            whisparr_rename: true,
            quality_profile: default_quality_profile(),
            root_folder: None,
            ignore_tags: Vec::new(),
            dev_mode: false,
            path_mapping: BTreeMap::new(),
            max_log_body: default_max_log_body(),
            max_path_length: default_max_path_length(),
            logging: LogConfig::default(),
        }
    }

    /// First configured ignore tag present in `tags`, if any.
    pub fn ignored_tag<'a, I>(&self, tags: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter()
            .find(|tag| self.ignore_tags.iter().any(|ignored| ignored == *tag))
            .map(String::as_str)
    }
}

fn default_true() -> bool {
    true
}

fn default_endpoint_substr() -> String {
    "stashdb.org".to_string()
}

fn default_quality_profile() -> String {
    "Any".to_string()
}

fn default_max_log_body() -> usize {
    1000
}

fn default_max_path_length() -> usize {
    100
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_file_level() -> String {
    "DEBUG".to_string()
}

fn default_log_file_location() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_file_type() -> String {
    "SINGLE-FILE".to_string()
}

fn default_log_file_max_bytes() -> u64 {
    5_000_000
}

fn default_log_file_backup_count() -> usize {
    3
}

fn default_log_file_rotate_when() -> String {
    "midnight".to_string()
}

fn non_empty_trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(serde::de::Error::custom("must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn expand(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).as_ref())
}

fn optional_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(expand))
}

fn expanded_path<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.trim().is_empty() {
        return Ok(default_log_file_location());
    }
    Ok(expand(value.trim()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<serde_json::Value>),
    Text(String),
}

/// Tags may arrive as a list, a JSON-encoded list, or a comma-separated string.
fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawTags> = Option::deserialize(deserializer)?;
    let tags = match raw {
        None => Vec::new(),
        Some(RawTags::List(values)) => values.into_iter().map(value_to_tag).collect(),
        Some(RawTags::Text(text)) => parse_tag_text(&text),
    };
    Ok(tags)
}

fn value_to_tag(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

pub(crate) fn parse_tag_text(text: &str) -> Vec<String> {
    if let Ok(serde_json::Value::Array(values)) = serde_json::from_str(text) {
        return values.into_iter().map(value_to_tag).collect();
    }
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
