use super::types::{MediaItem, SceneData, ServerConnection};
use crate::error::{BridgeError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const FIND_SCENE_QUERY: &str = r#"
query FindScene($id: ID!) {
  findScene(id: $id) {
    id
    title
    tags { name }
    files { path }
    stash_ids { endpoint stash_id }
  }
}
"#;

const CONFIGURATION_QUERY: &str = r#"
query Configuration {
  configuration { plugins }
}
"#;

/// The media library side of the bridge
#[async_trait::async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Fetch a scene by id, `None` if Stash does not know it
    async fn find_scene(&self, id: &str) -> Result<Option<MediaItem>>;

    /// Settings saved for `plugin_id` in the Stash UI
    async fn plugin_settings(&self, plugin_id: &str) -> Result<Map<String, Value>>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// GraphQL client for the Stash server that invoked the hook
pub struct StashClient {
    client: Client,
    endpoint: String,
    cookie: Option<String>,
    api_key: Option<String>,
}

impl StashClient {
    pub fn new(connection: &ServerConnection) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            endpoint: connection.graphql_url(),
            cookie: connection
                .session_cookie
                .as_ref()
                .map(|c| format!("{}={}", c.name, c.value)),
            api_key: connection.api_key.clone().filter(|k| !k.is_empty()),
        }
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));

        if let Some(ref cookie) = self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        if let Some(ref key) = self.api_key {
            request = request.header("ApiKey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BridgeError::Stash(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Stash(format!("{} returned {}: {}", self.endpoint, status, body)));
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Stash(format!("invalid GraphQL response: {}", e)))?;

        if !body.errors.is_empty() {
            let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(BridgeError::Stash(messages.join("; ")));
        }

        Ok(body.data.unwrap_or(Value::Null))
    }
}

#[async_trait::async_trait]
impl MediaLibrary for StashClient {
    async fn find_scene(&self, id: &str) -> Result<Option<MediaItem>> {
        let data = self.query(FIND_SCENE_QUERY, json!({ "id": id })).await?;

        match data.get("findScene") {
            None | Some(Value::Null) => Ok(None),
            Some(scene) => {
                let scene: SceneData = serde_json::from_value(scene.clone())
                    .map_err(|e| BridgeError::Stash(format!("scene {} validation failed: {}", id, e)))?;
                Ok(Some(scene.into()))
            }
        }
    }

    async fn plugin_settings(&self, plugin_id: &str) -> Result<Map<String, Value>> {
        let data = self.query(CONFIGURATION_QUERY, json!({})).await?;

        let settings = data
            .pointer("/configuration/plugins")
            .and_then(|plugins| plugins.get(plugin_id))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(settings)
    }
}
