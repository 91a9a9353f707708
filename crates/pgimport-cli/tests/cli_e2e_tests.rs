//! End-to-end tests for the pgimport binary
//!
//! These tests run the real binary against a mock import endpoint:
//! - full upload pipeline (init, chunks, finalize, import)
//! - resuming an interrupted upload from the server offset
//! - pre-flight validation
//! - job listing, status and control commands

use assert_cmd::Command;
use pgimport_common::checksum::chunk_checksum;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, query_param},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

/// Acknowledges contiguous chunks the way the server does
struct ChunkResponder;

impl Respond for ChunkResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let offset: u64 = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "offset")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);

        let expected = chunk_checksum(&request.body);
        let sent = request
            .headers
            .get("X-Checksum")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if sent != expected {
            return ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "BAD_CHECKSUM"}));
        }

        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "OK",
            "uploaded_bytes": offset + request.body.len() as u64
        }))
    }
}

fn pgimport(server: &MockServer, state_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pgimport").unwrap();
    cmd.env("PGIMPORT_STATE_DIR", state_dir)
        .env_remove("PGIMPORT_SERVER_ID")
        .env_remove("PGIMPORT_LOG_LEVEL")
        .env_remove("PGIMPORT_LOG_OUTPUT")
        .arg("--server-url")
        .arg(server.uri());
    cmd
}

fn write_dump(dir: &TempDir, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let body: Vec<u8> = b"INSERT INTO t VALUES (1);\n"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect();
    fs::write(&path, body).expect("Failed to write dump");
    path
}

async fn mount_pipeline(server: &MockServer, job_id: &str, size: u64) {
    Mock::given(method("POST"))
        .and(query_param("action", "upload_chunk"))
        .and(query_param("job_id", job_id))
        .respond_with(ChunkResponder)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(query_param("action", "finalize_upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"size": size})))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "uploaded", "offset": 0})),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(query_param("action", "process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "finished",
            "offset": size,
            "errors": 0,
            "log": ["Import complete"]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_upload_runs_full_pipeline() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let dump = write_dump(&dir, "prod.sql", 1000);

    Mock::given(method("POST"))
        .and(query_param("action", "init_upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"job_id": "j1", "chunk_size": 256})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_pipeline(&server, "j1", 1000).await;

    pgimport(&server, dir.path())
        .arg("upload")
        .arg(&dump)
        .assert()
        .success()
        .stdout(predicate::str::contains("Import of job j1 finished"));

    let chunk_offsets: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.query().is_some_and(|q| q.contains("action=upload_chunk")))
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "offset")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    assert_eq!(chunk_offsets, vec!["0", "256", "512", "768"]);
}

#[tokio::test]
async fn test_upload_resumes_from_server_offset() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let dump = write_dump(&dir, "big.sql", 1000);

    // First run: every chunk lands but finalize fails, so the resume token
    // survives.
    Mock::given(method("POST"))
        .and(query_param("action", "init_upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"job_id": "j9", "chunk_size": 400})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("action", "upload_chunk"))
        .respond_with(ChunkResponder)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("action", "finalize_upload"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    pgimport(&server, dir.path())
        .arg("upload")
        .arg(&dump)
        .arg("--no-auto")
        .assert()
        .failure();

    // Second run: the token points at j9, which reports 800 bytes received.
    server.reset().await;
    Mock::given(method("GET"))
        .and(query_param("action", "upload_status"))
        .and(query_param("job_id", "j9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"uploaded_bytes": 800, "chunk_size": 400})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_pipeline(&server, "j9", 1000).await;

    pgimport(&server, dir.path())
        .arg("upload")
        .arg(&dump)
        .assert()
        .success()
        .stdout(predicate::str::contains("j9"));

    let requests = server.received_requests().await.unwrap();
    assert!(!requests
        .iter()
        .any(|r| r.url.query().is_some_and(|q| q.contains("action=init_upload"))));
    let offsets: Vec<String> = requests
        .iter()
        .filter(|r| r.url.query().is_some_and(|q| q.contains("action=upload_chunk")))
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "offset")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    assert_eq!(offsets, vec!["800"]);
}

#[tokio::test]
async fn test_empty_file_fails_without_network() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("empty.sql");
    fs::write(&dump, b"").unwrap();

    pgimport(&server, dir.path())
        .arg("upload")
        .arg(&dump)
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty"));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_file_is_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    pgimport(&server, dir.path())
        .arg("upload")
        .arg(dir.path().join("nope.sql"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[tokio::test]
async fn test_jobs_lists_actions() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(query_param("action", "list_jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jobs": [
                {"job_id": "j1", "status": "uploaded", "offset": 0, "size": 2048, "filename": "prod.sql"},
                {"job_id": "j2", "status": "paused", "offset": 512, "size": 2048}
            ]
        })))
        .mount(&server)
        .await;

    pgimport(&server, dir.path())
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("prod.sql"))
        .stdout(predicate::str::contains("Start Import"))
        .stdout(predicate::str::contains("Retry/Resume"));
}

#[tokio::test]
async fn test_status_prints_log() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(query_param("action", "status"))
        .and(query_param("job_id", "j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "error",
            "offset": 100,
            "errors": 2,
            "log": [{"message": "relation users already exists", "level": "error"}]
        })))
        .mount(&server)
        .await;

    pgimport(&server, dir.path())
        .arg("status")
        .arg("j1")
        .assert()
        .success()
        .stdout(predicate::str::contains("error"))
        .stdout(predicate::str::contains("relation users already exists"));
}

#[tokio::test]
async fn test_delete_with_yes_skips_prompt() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(query_param("action", "status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "finished", "offset": 10})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("action", "delete_job"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("action", "list_jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"jobs": []})))
        .mount(&server)
        .await;

    pgimport(&server, dir.path())
        .arg("delete")
        .arg("j1")
        .arg("--yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted job"));
}

#[tokio::test]
async fn test_pause_of_finished_job_is_refused() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(query_param("action", "status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "finished", "offset": 10})),
        )
        .mount(&server)
        .await;

    pgimport(&server, dir.path())
        .arg("pause")
        .arg("j1")
        .arg("--yes")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot pause"));
}
