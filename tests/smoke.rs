// ABOUTME: End-to-end smoke test for the full logtap pipeline.
// ABOUTME: Tails a temp file through the ingestor into a store and reads the records back over HTTP.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http::Request;
use logtap_core::{IngestConfig, IngestHandle, MemoryStore, RecordStore, spawn_ingestor};
use logtap_server::{AppState, create_router};
use tower::ServiceExt;

/// Helper to GET a path and decode the JSON body.
async fn get_json(app: axum::Router, uri: &str) -> (u16, serde_json::Value) {
    let resp = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn append(path: &std::path::Path, text: &str) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
}

/// Write throwaway lines until the ingestor has read one, so later writes
/// are known to land after the tail was opened.
async fn prime(path: &std::path::Path, handle: &IngestHandle) {
    for _ in 0..200 {
        append(path, "booting\n");
        tokio::time::sleep(Duration::from_millis(10)).await;
        if handle.stats().summary().lines > 0 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            return;
        }
    }
    panic!("ingestor never read the source");
}

async fn wait_for_records(store: &Arc<dyn RecordStore>, n: u64) {
    for _ in 0..300 {
        if store.head() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} records, store head is {}", n, store.head());
}

#[tokio::test]
async fn smoke_test_full_pipeline() {
    // 1. Source file with output from before the tail starts
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("out.txt");
    std::fs::write(&source, "{\"old\": true}\n").unwrap();

    // 2. Store, ingestor, and router
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let mut config = IngestConfig::new(&source);
    config.poll_interval = Duration::from_millis(10);
    let handle = spawn_ingestor(config, Arc::clone(&store));

    let state = Arc::new(AppState::new(Arc::clone(&store)).with_ingest_stats(handle.stats()));
    let app = create_router(state);

    // 3. Nothing ingested yet
    let (status, json) = get_json(app.clone(), "/data").await;
    assert_eq!(status, 404);
    assert_eq!(json["error"], "no data yet");

    prime(&source, &handle).await;

    // 4. Program output: garbage, a split object, a malformed object, nesting
    append(&source, "starting worker 3\n");
    append(&source, "step {\"step\": 1, \"loss\": 0.5}{\"step\":\n");
    append(&source, " 2, \"loss\": 0.25}\n");
    append(&source, "{\"step\": oops}\n");
    append(&source, "{\"step\": 3, \"meta\": {\"tags\": [\"a\", \"b\"]}}\n");
    wait_for_records(&store, 3).await;

    // 5. Snapshot is newest first, without pre-existing output
    let (status, json) = get_json(app.clone(), "/data?limit=10").await;
    assert_eq!(status, 200);
    let steps: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["step"].as_i64().unwrap())
        .collect();
    assert_eq!(steps, vec![3, 2, 1]);
    assert_eq!(json[0]["meta"]["tags"][1], "b");
    assert!(json[0]["created_at"].is_string());
    assert!(!json.to_string().contains("old"));

    // 6. Latest record
    let (status, json) = get_json(app.clone(), "/data/latest").await;
    assert_eq!(status, 200);
    assert_eq!(json["step"], 3);

    // 7. Health reports counts, including the skipped malformed object
    let (status, json) = get_json(app.clone(), "/health").await;
    assert_eq!(status, 200);
    assert_eq!(json["records"], 3);
    assert_eq!(json["ingest"]["records"], 3);
    assert_eq!(json["ingest"]["parse_failures"], 1);

    // 8. Clean shutdown
    let summary = handle.stop().await.unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.parse_failures, 1);
}
