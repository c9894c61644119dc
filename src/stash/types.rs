use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// Payload Stash writes to a plugin's stdin when a hook fires
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub server_connection: Option<ServerConnection>,

    #[serde(default)]
    pub args: HookArgs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookArgs {
    #[serde(rename = "hookContext", default)]
    pub hook_context: Option<HookContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookContext {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,

    #[serde(rename = "type", default)]
    pub hook_type: Option<String>,
}

impl HookInput {
    /// Scene id carried by the hook context, if any
    pub fn scene_id(&self) -> Option<&str> {
        self.args
            .hook_context
            .as_ref()
            .and_then(|ctx| ctx.id.as_deref())
    }
}

/// How to reach the Stash server that invoked us
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerConnection {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default = "default_host")]
    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub session_cookie: Option<SessionCookie>,

    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

impl ServerConnection {
    /// GraphQL endpoint. A wildcard bind address is dialled as localhost.
    pub fn graphql_url(&self) -> String {
        let host = match self.host.as_str() {
            "" | "0.0.0.0" => "localhost",
            other => other,
        };
        format!("{}://{}:{}/graphql", self.scheme, host, self.port)
    }
}

/// Hook ids arrive as numbers or strings depending on the Stash version.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One (endpoint, id) pair linking a scene to a stash-box database
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StashId {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub stash_id: String,
}

/// A Stash scene reduced to what the bridge needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub paths: Vec<PathBuf>,
    pub stash_ids: Vec<StashId>,
}

impl MediaItem {
    /// Canonical StashDB id: the id of the first entry whose endpoint
    /// contains `endpoint_substr`.
    pub fn stashdb_id(&self, endpoint_substr: &str) -> Option<&str> {
        self.stash_ids
            .iter()
            .find(|sid| sid.endpoint.contains(endpoint_substr) && !sid.stash_id.is_empty())
            .map(|sid| sid.stash_id.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagRef {
    Named { name: String },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct FileRef {
    #[serde(default)]
    path: Option<String>,
}

/// Scene shape returned by the `findScene` query
#[derive(Debug, Deserialize)]
pub(crate) struct SceneData {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: Vec<TagRef>,
    #[serde(default)]
    files: Vec<FileRef>,
    #[serde(default)]
    stash_ids: Vec<StashId>,
}

impl From<SceneData> for MediaItem {
    fn from(scene: SceneData) -> Self {
        MediaItem {
            id: scene.id.unwrap_or_default(),
            title: scene.title.unwrap_or_default(),
            tags: scene
                .tags
                .into_iter()
                .map(|tag| match tag {
                    TagRef::Named { name } => name,
                    TagRef::Plain(name) => name,
                })
                .collect(),
            paths: scene
                .files
                .into_iter()
                .filter_map(|f| f.path)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect(),
            stash_ids: scene.stash_ids,
        }
    }
}
