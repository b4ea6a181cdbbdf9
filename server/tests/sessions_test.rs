//! Integration tests for the session REST API: create, lookup, export.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use whiteboard_server::sessions::store::SessionStore;
use whiteboard_server::state::{AppState, LivenessPolicy};
use whiteboard_server::ws::SessionRegistry;

/// Helper: start the server on a random port and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr, tempfile::TempDir) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = whiteboard_server::db::init_db(&data_dir).expect("Failed to init DB");
    let state = AppState {
        store: SessionStore::new(db),
        registry: SessionRegistry::new(),
        liveness: LivenessPolicy {
            idle_ping_interval: Duration::from_secs(60),
        },
        cors_origin: "http://localhost:3000".to_string(),
    };

    let app = whiteboard_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr, tmp_dir)
}

#[tokio::test]
async fn create_get_export_lifecycle() {
    let (base_url, _addr, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    // Create
    let resp = client
        .post(format!("{}/api/sessions", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert_eq!(session_id.len(), 8);
    assert_eq!(body["message"], "Session created successfully");

    // Get
    let resp = client
        .get(format!("{}/api/sessions/{}", base_url, session_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["session_id"], session_id.as_str());
    assert_eq!(body["objects"], serde_json::json!([]));
    assert_eq!(body["active_users"], serde_json::json!([]));

    // Export
    let resp = client
        .post(format!("{}/api/sessions/{}/export", base_url, session_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["session_id"], session_id.as_str());
    assert_eq!(body["total_objects"], 0);
    assert!(body["exported_at"].is_string());
}

#[tokio::test]
async fn unknown_session_returns_404() {
    let (base_url, _addr, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/sessions/NOPE1234", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/api/sessions/NOPE1234/export", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn banner_and_health_endpoints() {
    let (base_url, _addr, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/", base_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Collaborative Whiteboard API");

    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn sessions_are_independent_documents() {
    let (base_url, _addr, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let first: serde_json::Value = client
        .post(format!("{}/api/sessions", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: serde_json::Value = client
        .post(format!("{}/api/sessions", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_ne!(first["session_id"], second["session_id"]);
}
