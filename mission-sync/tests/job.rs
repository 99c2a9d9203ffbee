use std::path::Path;
use std::time::Duration;

use mission_core::StoreClient;
use mission_sync::config::SyncConfig;
use mission_sync::job::SyncJob;
use mission_sync::sync::retry::RetryPolicy;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write(root: &Path, relative: &str, content: &str) {
    let file = root.join(relative);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, content).unwrap();
}

fn job_for(server: &MockServer, root: &Path) -> SyncJob<StoreClient> {
    let mut config = SyncConfig::new(root.to_path_buf(), server.uri());
    config.site_url = server.uri();
    config.orchestrator.retry = RetryPolicy::new(2, Duration::ZERO);
    let client = StoreClient::new(&config.store_url, &config.site_url).unwrap();
    SyncJob::new(config, client)
}

async fn mount_function(
    server: &MockServer,
    kind: &str,
    function: &str,
    value: serde_json::Value,
) {
    Mock::given(method("POST"))
        .and(path(format!("/api/{kind}")))
        .and(body_partial_json(json!({ "path": function })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "success", "value": value })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn first_run_creates_files_and_reports_stale_entries() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    write(dir.path(), "memory/note.md", "hi");

    mount_function(&server, "query", "sync/getByPath", json!(null)).await;
    Mock::given(method("POST"))
        .and(path("/api/mutation"))
        .and(body_partial_json(json!({
            "path": "sync/syncFile",
            "args": {
                "path": "memory/note.md",
                "title": "note",
                "hash": "49f68a5c8493ec2c0bf489821c21fc3b",
                "category": "memory",
                "size": 2
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "value": { "action": "created", "id": "doc1" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_function(
        &server,
        "query",
        "sync/getAllSyncedPaths",
        json!([
            { "path": "memory/note.md", "hash": "49f68a5c8493ec2c0bf489821c21fc3b" },
            { "path": "memory/old.md", "hash": "0", "updatedAt": 1.7e12 }
        ]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/mutation"))
        .and(body_partial_json(json!({ "path": "sync/deleteFile" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/log"))
        .and(body_partial_json(json!({
            "actionType": "workspace_sync",
            "result": "success",
            "details": "Synced 1 files: 1 created, 0 updated, 0 unchanged, 0 errors"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let report = job_for(&server, dir.path()).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.result.created, 1);
    let deletions = report.deletions.as_ref().unwrap();
    assert!(deletions.dry_run);
    assert_eq!(deletions.candidates, vec!["memory/old.md".to_string()]);
}

#[tokio::test]
async fn server_errors_fail_the_run_and_are_logged() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    write(dir.path(), "memory/note.md", "hi");

    mount_function(&server, "query", "sync/getByPath", json!(null)).await;
    Mock::given(method("POST"))
        .and(path("/api/mutation"))
        .and(body_partial_json(json!({ "path": "sync/syncFile" })))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(2)
        .mount(&server)
        .await;
    mount_function(&server, "query", "sync/getAllSyncedPaths", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/log"))
        .and(body_partial_json(json!({ "result": "error" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let report = job_for(&server, dir.path()).run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.result.errors.len(), 1);
    assert!(report.result.errors[0].starts_with("memory/note.md: failed after 2 attempts"));
}

#[tokio::test]
async fn unreachable_audit_log_does_not_fail_the_run() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    write(dir.path(), "memory/note.md", "hi");

    mount_function(
        &server,
        "query",
        "sync/getByPath",
        json!({
            "_id": "doc1",
            "path": "memory/note.md",
            "hash": "49f68a5c8493ec2c0bf489821c21fc3b"
        }),
    )
    .await;
    mount_function(&server, "query", "sync/getAllSyncedPaths", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/log"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let report = job_for(&server, dir.path()).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.result.unchanged, 1);
}

#[tokio::test]
async fn unresolvable_workspace_root_is_logged_as_fatal() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/log"))
        .and(body_partial_json(json!({
            "actionType": "workspace_sync",
            "result": "error"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let job = job_for(&server, &dir.path().join("does-not-exist"));
    let err = job.run().await.unwrap_err();
    assert!(err.to_string().contains("cannot resolve workspace root"));

    job.report_fatal(&err).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/log");
}
