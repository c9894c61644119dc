//! Reconciliation tests
//!
//! Drive `SceneReconciler` against a mocked Whisparr and real temp directories.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use whisparr_bridge::arr::{RetryPolicy, WhisparrClient};
use whisparr_bridge::bridge::{SceneOutcome, SceneReconciler, SceneReport};
use whisparr_bridge::config::BridgeConfig;
use whisparr_bridge::stash::{MediaItem, StashId};
use whisparr_bridge::BridgeError;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STASH_ID: &str = "5e4c-stashdb";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config_for(server: &MockServer) -> BridgeConfig {
    BridgeConfig::new(server.uri(), "test-key")
}

fn client_for(config: &BridgeConfig) -> WhisparrClient {
    WhisparrClient::new(config).with_retry(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    })
}

fn scene_item(paths: Vec<PathBuf>) -> MediaItem {
    MediaItem {
        id: "1".to_string(),
        title: "Test Scene".to_string(),
        tags: vec![],
        paths,
        stash_ids: vec![
            StashId {
                endpoint: "https://fansdb.cc/graphql".to_string(),
                stash_id: "other".to_string(),
            },
            StashId {
                endpoint: "https://stashdb.org/graphql".to_string(),
                stash_id: STASH_ID.to_string(),
            },
        ],
    }
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

async fn mount_existing_record(server: &MockServer, record_dir: &Path) {
    Mock::given(method("GET"))
        .and(path("/api/v3/movie"))
        .and(query_param("stashId", STASH_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 42, "title": "Test Scene", "path": path_str(record_dir) }
        ])))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_preview(server: &MockServer, folder: &str, files: &[PathBuf]) {
    let entries: Vec<_> = files
        .iter()
        .map(|f| {
            json!({
                "path": path_str(f),
                "folderName": "Test Scene",
                "size": 4,
                "quality": { "quality": { "id": 1, "name": "Unknown" } }
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/api/v3/manualimport"))
        .and(query_param("folder", folder))
        .and(query_param("movieId", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;
}

async fn expect_command(server: &MockServer, name: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v3/command"))
        .and(body_partial_json(json!({ "name": name })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 1, "status": "queued" })))
        .expect(times)
        .mount(server)
        .await;
}

fn completed(outcome: SceneOutcome) -> SceneReport {
    match outcome {
        SceneOutcome::Completed(report) => report,
        other => panic!("expected completed outcome, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Lookup / create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scene_without_stashdb_id_makes_no_calls() {
    let server = MockServer::start().await;
    let config = config_for(&server);
    let client = client_for(&config);

    let mut item = scene_item(vec![]);
    item.stash_ids.retain(|sid| !sid.endpoint.contains("stashdb.org"));

    let outcome = SceneReconciler::new(&client, &config)
        .process_scene(&item)
        .await
        .unwrap();

    assert!(matches!(outcome, SceneOutcome::Skipped { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn ambiguous_lookup_never_creates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "title": "A", "path": "/data/a" },
            { "id": 2, "title": "B", "path": "/data/b" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = client_for(&config);
    let err = SceneReconciler::new(&client, &config)
        .process_scene(&scene_item(vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::RecordNotFound { .. }));
}

#[tokio::test]
async fn lookup_503_is_retried_then_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = client_for(&config);
    let err = SceneReconciler::new(&client, &config)
        .process_scene(&scene_item(vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::RemoteService { status: Some(503), .. }));
}

#[tokio::test]
async fn unknown_quality_profile_falls_back_to_first() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/qualityprofile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 4, "name": "HD" },
            { "id": 6, "name": "SD" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/rootfolder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "path": "/data/whisparr" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/movie"))
        .and(body_partial_json(json!({
            "title": "Test Scene",
            "foreignId": STASH_ID,
            "stashId": STASH_ID,
            "monitored": true,
            "qualityProfileId": 4,
            "rootFolderPath": "/data/whisparr",
            "addOptions": { "monitor": "movieOnly", "searchForMovie": false }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 42, "title": "Test Scene", "path": path_str(record_dir.path())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.quality_profile = "Missing".to_string();
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![]))
            .await
            .unwrap(),
    );
    assert!(report.created);
    assert_eq!(report.record_id, 42);
}

#[tokio::test]
async fn configured_root_folder_is_preferred() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/rootfolder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "path": "/a" },
            { "path": "/b/" }
        ])))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.root_folder = Some(PathBuf::from("/b"));
    let client = client_for(&config);

    let root = SceneReconciler::new(&client, &config)
        .root_folder_path()
        .await
        .unwrap();
    assert_eq!(root, "/b/");
}

#[tokio::test]
async fn failed_create_aborts_scene() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/qualityprofile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "Any" }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/rootfolder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "path": "/data" }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!([{ "errorMessage": "bad" }])))
        .expect(1)
        .mount(&server)
        .await;
    expect_command(&server, "ManualImport", 0).await;

    let config = config_for(&server);
    let client = client_for(&config);
    let err = SceneReconciler::new(&client, &config)
        .process_scene(&scene_item(vec![PathBuf::from("/nowhere/a.mp4")]))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::RecordNotFound { .. }));
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_files_are_skipped() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    mount_existing_record(&server, record_dir.path()).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/manualimport"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    expect_command(&server, "ManualImport", 0).await;

    let config = config_for(&server);
    let client = client_for(&config);
    let item = scene_item(vec![record_dir.path().join("gone.mp4")]);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&item)
            .await
            .unwrap(),
    );
    assert_eq!(report.missing, 1);
    assert_eq!(report.imported, 0);
    assert!(!report.renamed);
}

#[tokio::test]
async fn file_in_place_is_imported_and_renamed() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    let file = record_dir.path().join("scene.mp4");
    fs::write(&file, b"data").unwrap();

    mount_existing_record(&server, record_dir.path()).await;
    mount_preview(&server, &path_str(record_dir.path()), &[file.clone()]).await;
    expect_command(&server, "ManualImport", 1).await;
    expect_command(&server, "RenameFiles", 1).await;

    let mut config = config_for(&server);
    config.move_files = true;
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file.clone()]))
            .await
            .unwrap(),
    );
    assert_eq!(report.imported, 1);
    assert!(report.renamed);
    assert!(file.exists());
}

#[tokio::test]
async fn rename_is_queued_once_for_many_imports() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    let first = record_dir.path().join("one.mp4");
    let second = record_dir.path().join("two.mp4");
    fs::write(&first, b"1").unwrap();
    fs::write(&second, b"2").unwrap();

    mount_existing_record(&server, record_dir.path()).await;
    mount_preview(&server, &path_str(record_dir.path()), &[first.clone(), second.clone()]).await;
    expect_command(&server, "ManualImport", 2).await;
    expect_command(&server, "RenameFiles", 1).await;

    let config = config_for(&server);
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![first, second]))
            .await
            .unwrap(),
    );
    assert_eq!(report.imported, 2);
    assert!(report.renamed);
}

#[tokio::test]
async fn rename_disabled_queues_no_rename() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    let file = record_dir.path().join("scene.mp4");
    fs::write(&file, b"data").unwrap();

    mount_existing_record(&server, record_dir.path()).await;
    mount_preview(&server, &path_str(record_dir.path()), &[file.clone()]).await;
    expect_command(&server, "ManualImport", 1).await;
    expect_command(&server, "RenameFiles", 0).await;

    let mut config = config_for(&server);
    config.whisparr_rename = false;
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file]))
            .await
            .unwrap(),
    );
    assert_eq!(report.imported, 1);
    assert!(!report.renamed);
}

#[tokio::test]
async fn unmatched_preview_means_already_imported() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    let file = record_dir.path().join("scene.mp4");
    fs::write(&file, b"data").unwrap();

    mount_existing_record(&server, record_dir.path()).await;
    mount_preview(
        &server,
        &path_str(record_dir.path()),
        &[record_dir.path().join("different.mp4")],
    )
    .await;
    expect_command(&server, "ManualImport", 0).await;
    expect_command(&server, "RenameFiles", 0).await;

    let config = config_for(&server);
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file]))
            .await
            .unwrap(),
    );
    assert_eq!(report.already_imported, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn file_elsewhere_is_left_alone_when_moving_disabled() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    let source_dir = tempdir().unwrap();
    let file = source_dir.path().join("scene.mp4");
    fs::write(&file, b"data").unwrap();

    mount_existing_record(&server, record_dir.path()).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/manualimport"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file.clone()]))
            .await
            .unwrap(),
    );
    assert_eq!(report.not_in_place, 1);
    assert!(file.exists());
}

#[tokio::test]
async fn file_elsewhere_is_moved_then_imported() {
    let server = MockServer::start().await;
    let record_root = tempdir().unwrap();
    let record_dir = record_root.path().join("Test Scene (2024)");
    let source_dir = tempdir().unwrap();
    let file = source_dir.path().join("scene.mp4");
    fs::write(&file, b"data").unwrap();
    let moved = record_dir.join("scene.mp4");

    mount_existing_record(&server, &record_dir).await;
    mount_preview(&server, &path_str(&record_dir), &[moved.clone()]).await;
    expect_command(&server, "ManualImport", 1).await;
    expect_command(&server, "RenameFiles", 1).await;

    let mut config = config_for(&server);
    config.move_files = true;
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file.clone()]))
            .await
            .unwrap(),
    );
    assert_eq!(report.imported, 1);
    assert!(!file.exists());
    assert_eq!(fs::read(&moved).unwrap(), b"data");
}

#[tokio::test]
async fn failing_file_does_not_stop_the_rest() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    let bad = record_dir.path().join("bad.mp4");
    let good = record_dir.path().join("good.mp4");
    fs::write(&bad, b"1").unwrap();
    fs::write(&good, b"2").unwrap();

    mount_existing_record(&server, record_dir.path()).await;
    mount_preview(&server, &path_str(record_dir.path()), &[bad.clone(), good.clone()]).await;
    Mock::given(method("POST"))
        .and(path("/api/v3/command"))
        .and(body_partial_json(json!({ "files": [{ "path": path_str(&bad) }] })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/command"))
        .and(body_partial_json(json!({ "files": [{ "path": path_str(&good) }] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 2 })))
        .expect(1)
        .mount(&server)
        .await;
    expect_command(&server, "RenameFiles", 1).await;

    let config = config_for(&server);
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![bad, good]))
            .await
            .unwrap(),
    );
    assert_eq!(report.failed, 1);
    assert_eq!(report.imported, 1);
    assert!(report.renamed);
}

#[tokio::test]
async fn rejected_imports_queue_no_rename() {
    let server = MockServer::start().await;
    let record_dir = tempdir().unwrap();
    let file = record_dir.path().join("scene.mp4");
    fs::write(&file, b"data").unwrap();

    mount_existing_record(&server, record_dir.path()).await;
    mount_preview(&server, &path_str(record_dir.path()), &[file.clone()]).await;
    Mock::given(method("POST"))
        .and(path("/api/v3/command"))
        .and(body_partial_json(json!({ "name": "ManualImport" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    expect_command(&server, "RenameFiles", 0).await;

    let config = config_for(&server);
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file]))
            .await
            .unwrap(),
    );
    assert_eq!(report.failed, 1);
    assert_eq!(report.imported, 0);
    assert!(!report.renamed);
}

#[tokio::test]
async fn record_without_path_fails_only_its_files() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let file = dir.path().join("scene.mp4");
    fs::write(&file, b"data").unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 42, "title": "Test Scene", "path": null }
        ])))
        .mount(&server)
        .await;
    expect_command(&server, "ManualImport", 0).await;

    let config = config_for(&server);
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file]))
            .await
            .unwrap(),
    );
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn path_mapping_translates_both_directions() {
    let server = MockServer::start().await;
    let local_root = tempdir().unwrap();
    let local_dir = local_root.path().join("Test Scene");
    fs::create_dir_all(&local_dir).unwrap();
    let file = local_dir.join("scene.mp4");
    fs::write(&file, b"data").unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v3/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 42, "title": "Test Scene", "path": "/data/whisparr/Test Scene" }
        ])))
        .mount(&server)
        .await;
    mount_preview(
        &server,
        "/data/whisparr/Test Scene",
        &[PathBuf::from("/data/whisparr/Test Scene/scene.mp4")],
    )
    .await;
    expect_command(&server, "ManualImport", 1).await;
    expect_command(&server, "RenameFiles", 1).await;

    let mut config = config_for(&server);
    config
        .path_mapping
        .insert("/data/whisparr".to_string(), path_str(local_root.path()));
    let client = client_for(&config);

    let report = completed(
        SceneReconciler::new(&client, &config)
            .process_scene(&scene_item(vec![file]))
            .await
            .unwrap(),
    );
    assert_eq!(report.imported, 1);
}
