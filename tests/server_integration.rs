//! HTTP API tests.
//!
//! Most tests serve the router over an `InMemoryStore` on an ephemeral
//! port; one starts the full `run_server` path against SQLite.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use coursetrack::config::{Config, DbConfig, ServerConfig};
use coursetrack::server::{router, AppState};
use coursetrack::{migrate, server};
use coursetrack_core::store::memory::InMemoryStore;
use coursetrack_core::store::Store;

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Seed `rust-101` (teacher 100, lessons l1..l4) and serve it. Returns the
/// base URL.
async fn spawn_memory_server() -> String {
    let store = InMemoryStore::new();
    store
        .create_course("rust-101", "Rust 101", Some(100))
        .await
        .unwrap();
    store.add_module("rust-101", "basics", "Basics").await.unwrap();
    for slug in ["l1", "l2", "l3", "l4"] {
        store.add_lesson("basics", slug, slug).await.unwrap();
    }
    store.create_course("go-101", "Go 101", Some(200)).await.unwrap();

    let state = AppState::new(Arc::new(Config::minimal()), Arc::new(store));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn as_user(req: reqwest::RequestBuilder, user_id: i64, role: &str) -> reqwest::RequestBuilder {
    req.header("x-user-id", user_id.to_string())
        .header("x-user-role", role)
}

async fn enroll(client: &Client, base: &str, user_id: i64) -> i64 {
    let resp = as_user(
        client.post(format!("{}/courses/rust-101/enroll", base)),
        user_id,
        "student",
    )
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

async fn complete(client: &Client, base: &str, user_id: i64, id: i64, lesson: &str) -> reqwest::Response {
    as_user(
        client.post(format!("{}/enrollments/{}/lessons/{}/complete", base, id, lesson)),
        user_id,
        "student",
    )
    .send()
    .await
    .unwrap()
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_is_public() {
    let base = spawn_memory_server().await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_identity_is_401() {
    let base = spawn_memory_server().await;
    let client = Client::new();

    let resp = client
        .post(format!("{}/courses/rust-101/enroll", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(resp).await, "unauthorized");

    let resp = as_user(client.get(format!("{}/enrollments", base)), 7, "wizard")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_complete_flow_and_certificate() {
    let base = spawn_memory_server().await;
    let client = Client::new();
    let id = enroll(&client, &base, 7).await;

    let mut last = Value::Null;
    for lesson in ["l1", "l2", "l3", "l4"] {
        let resp = complete(&client, &base, 7, id, lesson).await;
        assert_eq!(resp.status(), StatusCode::OK);
        last = resp.json().await.unwrap();
    }
    assert_eq!(last["progress_percentage"], 100);
    assert_eq!(last["course_completed"], true);
    assert!(last["completed_at"].is_string());

    let resp = as_user(
        client.post(format!("{}/enrollments/{}/certificate", base, id)),
        7,
        "student",
    )
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cert: Value = resp.json().await.unwrap();
    let code = cert["verification_code"].as_str().unwrap().to_string();

    // Verification needs no identity.
    let resp = client
        .get(format!("{}/certificates/{}", base, code))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["certificate"]["enrollment_id"], id);

    let resp = client
        .get(format!("{}/certificates/ffffffffffffffff", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repeat_completion_is_idempotent() {
    let base = spawn_memory_server().await;
    let client = Client::new();
    let id = enroll(&client, &base, 7).await;

    let first: Value = complete(&client, &base, 7, id, "l1").await.json().await.unwrap();
    let second: Value = complete(&client, &base, 7, id, "l1").await.json().await.unwrap();
    assert_eq!(first["newly_completed"], true);
    assert_eq!(second["newly_completed"], false);
    assert_eq!(second["progress_percentage"], 25);
    assert_eq!(second["completed_lessons"], json!(["l1"]));
}

#[tokio::test]
async fn test_error_statuses() {
    let base = spawn_memory_server().await;
    let client = Client::new();
    let id = enroll(&client, &base, 7).await;

    let resp = complete(&client, &base, 7, id, "nope").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = complete(&client, &base, 7, 9999, "l1").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = as_user(
        client.post(format!("{}/enrollments/{}/certificate", base, id)),
        7,
        "student",
    )
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(resp).await, "not_eligible");
}

#[tokio::test]
async fn test_access_rules() {
    let base = spawn_memory_server().await;
    let client = Client::new();
    let id = enroll(&client, &base, 7).await;

    // Another student
    let resp = complete(&client, &base, 8, id, "l1").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(resp).await, "forbidden");

    // Owning teacher may read progress; a foreign teacher may not.
    let url = format!("{}/enrollments/{}/progress", base, id);
    let resp = as_user(client.get(&url), 100, "teacher").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = as_user(client.get(&url), 200, "teacher").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The owning teacher cannot change the student's enrollment.
    let resp = complete(&client, &base, 100, id, "l1").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(resp).await, "forbidden");
    let resp = as_user(
        client.post(format!("{}/enrollments/{}/certificate", base, id)),
        100,
        "teacher",
    )
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(resp).await, "forbidden");
    let progress: Value = as_user(client.get(&url), 7, "student")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress["progress_percentage"], 0);

    let url = format!("{}/courses/rust-101/report", base);
    let resp = as_user(client.get(&url), 7, "student").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = as_user(client.get(&url), 1, "admin").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["active_enrollments"], 1);
    assert_eq!(report["total_lessons"], 4);
}

#[tokio::test]
async fn test_dashboard_lists_own_enrollments() {
    let base = spawn_memory_server().await;
    let client = Client::new();
    enroll(&client, &base, 7).await;
    enroll(&client, &base, 8).await;

    let resp = as_user(client.get(format!("{}/enrollments", base)), 7, "student")
        .send()
        .await
        .unwrap();
    let rows: Value = resp.json().await.unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["course_slug"], "rust-101");
}

#[tokio::test]
async fn test_search_endpoint() {
    let base = spawn_memory_server().await;
    let client = Client::new();

    let body = json!({
        "course": [{ "slug": "go-101", "score": 0.5 }, { "slug": "rust-101", "score": 0.5 }],
        "module": [{ "slug": "basics", "score": 0.9 }],
        "lesson": [
            { "slug": "ghost", "score": 1.0 },
            { "slug": "l3", "score": 0.1, "metadata": { "course_slug": "py-101" } }
        ]
    });
    let resp = as_user(client.post(format!("{}/search", base)), 7, "student")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let out: Value = resp.json().await.unwrap();
    let results = out["results"].as_array().unwrap();

    let ids: Vec<&str> = results
        .iter()
        .map(|r| r["course_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["rust-101", "go-101", "py-101"]);
    assert_eq!(results[0]["match_type"], "module");
    assert_eq!(results[0]["course_title"], "Rust 101");
    assert!(results[2]["course_title"].is_null());
}

#[tokio::test]
async fn test_run_server_against_sqlite() {
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg = Config {
        db: DbConfig {
            path: tmp.path().join("data").join("ctrack.sqlite"),
        },
        server: ServerConfig {
            bind: format!("127.0.0.1:{}", port),
        },
        ..Config::minimal()
    };
    migrate::run_migrations(&cfg).await.unwrap();

    let store = coursetrack::sqlite_store::SqliteStore::connect(&cfg).await.unwrap();
    store.create_course("rust-101", "Rust 101", None).await.unwrap();
    store.add_module("rust-101", "basics", "Basics").await.unwrap();
    store.add_lesson("basics", "l1", "Hello").await.unwrap();
    let e = store.enroll(7, "rust-101", Utc::now()).await.unwrap();
    store.close().await;

    let server_cfg = cfg.clone();
    tokio::spawn(async move {
        server::run_server(&server_cfg).await.unwrap();
    });
    wait_for_server(port).await;

    let client = Client::new();
    let base = format!("http://127.0.0.1:{}", port);
    let resp = complete(&client, &base, 7, e.id, "l1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["progress_percentage"], 100);
    assert_eq!(body["course_completed"], true);
}
