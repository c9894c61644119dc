use super::http::{Decoded, HttpJson, JsonRequest, RetryPolicy};
use super::types::{
    Command, CommandStatus, ManualImportPreview, QualityProfile, RootFolder, SceneCreate,
    WhisparrScene,
};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::logging::safe_json_preview;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Scene creation can make Whisparr scan the root folder, so it gets longer
const CREATE_TIMEOUT: Duration = Duration::from_secs(120);

/// The Whisparr calls the bridge makes
#[async_trait::async_trait]
pub trait WhisparrApi: Send + Sync {
    /// Scenes whose stash id equals `stash_id`
    async fn find_scenes(&self, stash_id: &str) -> Result<Vec<WhisparrScene>>;

    /// Add a scene and return the created record
    async fn create_scene(&self, scene: &SceneCreate) -> Result<WhisparrScene>;

    async fn quality_profiles(&self) -> Result<Vec<QualityProfile>>;

    async fn root_folders(&self) -> Result<Vec<RootFolder>>;

    /// Import candidates Whisparr sees in `folder` for scene `movie_id`
    async fn manual_import_preview(
        &self,
        folder: &str,
        movie_id: i64,
    ) -> Result<Vec<ManualImportPreview>>;

    /// Queue a command. Completion is not awaited.
    async fn send_command(&self, command: &Command) -> Result<()>;
}

/// Whisparr v3 API client
pub struct WhisparrClient {
    http: HttpJson,
    base_url: String,
    max_log_body: usize,
}

impl WhisparrClient {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            http: HttpJson::new(&config.whisparr_key, config.max_log_body),
            base_url: config.whisparr_url.trim_end_matches('/').to_string(),
            max_log_body: config.max_log_body,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.http = self.http.with_retry(retry);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v3{}", self.base_url, path)
    }

    /// Treat a body that did not match the expected shape as a failed call
    fn expect_typed<T>(&self, decoded: Decoded<T>, method: &str, url: &str) -> Result<T> {
        match decoded {
            Decoded::Typed(value) => Ok(value),
            Decoded::Raw(raw) => Err(self.unexpected(method, url, &raw)),
        }
    }

    fn unexpected(&self, method: &str, url: &str, raw: &Value) -> BridgeError {
        BridgeError::RemoteService {
            method: method.to_string(),
            url: url.to_string(),
            status: None,
            body: format!(
                "unexpected response: {}",
                safe_json_preview(raw, self.max_log_body)
            ),
            source: None,
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = self.url(path);
        let decoded = self.http.send_decoded(&JsonRequest::get(&url)).await?;
        self.expect_typed(decoded, "GET", &url)
    }
}

#[async_trait::async_trait]
impl WhisparrApi for WhisparrClient {
    async fn find_scenes(&self, stash_id: &str) -> Result<Vec<WhisparrScene>> {
        let url = self.url("/movie");
        let decoded = self
            .http
            .send_decoded(&JsonRequest::get(&url).query("stashId", stash_id))
            .await?;
        self.expect_typed(decoded, "GET", &url)
    }

    async fn create_scene(&self, scene: &SceneCreate) -> Result<WhisparrScene> {
        let url = self.url("/movie");
        let body = serde_json::to_value(scene)
            .map_err(|e| BridgeError::record_not_found(&scene.title, e.to_string()))?;
        let decoded = self
            .http
            .send_decoded(&JsonRequest::post(&url, body).timeout(CREATE_TIMEOUT))
            .await?;
        self.expect_typed(decoded, "POST", &url)
    }

    async fn quality_profiles(&self) -> Result<Vec<QualityProfile>> {
        self.get_list("/qualityprofile").await
    }

    async fn root_folders(&self) -> Result<Vec<RootFolder>> {
        self.get_list("/rootfolder").await
    }

    async fn manual_import_preview(
        &self,
        folder: &str,
        movie_id: i64,
    ) -> Result<Vec<ManualImportPreview>> {
        let url = self.url("/manualimport");
        let request = JsonRequest::get(&url)
            .query("folder", folder)
            .query("movieId", movie_id)
            .query("filterExistingFiles", true);
        let decoded = self.http.send_decoded(&request).await?;
        self.expect_typed(decoded, "GET", &url)
    }

    async fn send_command(&self, command: &Command) -> Result<()> {
        let url = self.url("/command");
        let body = serde_json::to_value(command).map_err(|e| BridgeError::ImportFailure {
            path: url.clone(),
            message: e.to_string(),
        })?;

        let decoded: Decoded<CommandStatus> =
            self.http.send_decoded(&JsonRequest::post(&url, body)).await?;
        match decoded {
            Decoded::Typed(status) => tracing::debug!(
                "{} queued as command {} ({})",
                command.name(),
                status.id,
                status.status.as_deref().unwrap_or("unknown")
            ),
            Decoded::Raw(_) => tracing::debug!("{} queued", command.name()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WhisparrClient {
        let config = BridgeConfig::new(format!("{}/", server.uri()), "key");
        WhisparrClient::new(&config).with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn find_scenes_queries_by_stash_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/movie"))
            .and(query_param("stashId", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 3, "title": "Found", "path": "/data/found" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let scenes = client(&server).find_scenes("abc").await.unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, 3);
    }

    #[tokio::test]
    async fn malformed_list_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/qualityprofile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "oops": 1 })))
            .mount(&server)
            .await;

        let err = client(&server).quality_profiles().await.unwrap_err();
        assert!(err.to_string().contains("unexpected response"));
    }

    #[tokio::test]
    async fn preview_sends_folder_and_scene() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/manualimport"))
            .and(query_param("folder", "/data/scene"))
            .and(query_param("movieId", "4"))
            .and(query_param("filterExistingFiles", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "path": "/data/scene/a.mp4", "folderName": "scene", "size": 12 }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let previews = client(&server)
            .manual_import_preview("/data/scene", 4)
            .await
            .unwrap();
        assert_eq!(previews[0].size, 12);
    }

    #[tokio::test]
    async fn command_posts_named_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/command"))
            .and(body_partial_json(json!({ "name": "RenameFiles", "movieIds": [8] })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "id": 100, "status": "queued" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server).send_command(&Command::rename(8)).await.unwrap();
    }
}
