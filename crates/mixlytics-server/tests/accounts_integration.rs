use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use mixlytics_core::config::Config;
use mixlytics_duckdb::DuckDbBackend;
use mixlytics_server::app::build_app;
use mixlytics_server::state::AppState;

fn test_config() -> Config {
    Config {
        data_dir: "/tmp/mixlytics-test".to_string(),
        store_retry_attempts: 1,
        store_retry_delay_ms: 1,
        ..Config::default()
    }
}

fn test_app() -> Router {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()));
    build_app(state)
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

async fn post_json(app: &Router, uri: &str, body: Value) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn create_account(app: &Router, name: &str) -> String {
    let response = post_json(app, "/api/accounts", json!({ "name": name })).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["data"]["account_id"]
        .as_str()
        .expect("account id")
        .to_string()
}

// ============================================================
// BDD: Account creation mints a prefixed id
// ============================================================
#[tokio::test]
async fn test_create_account_returns_201_with_id() {
    let app = test_app();

    let response = post_json(&app, "/api/accounts", json!({ "name": "Acme Shoes" })).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["data"]["name"], "Acme Shoes");
    let id = body["data"]["account_id"].as_str().expect("account id");
    assert!(id.starts_with("acct_"));
}

#[tokio::test]
async fn test_blank_account_name_is_rejected() {
    let app = test_app();

    let response = post_json(&app, "/api/accounts", json!({ "name": "   " })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_input");
}

// ============================================================
// BDD: Metrics ingestion upserts by channel and date
// ============================================================
#[tokio::test]
async fn test_ingest_accepts_and_counts_rows() {
    let app = test_app();
    let account_id = create_account(&app, "Acme").await;

    let rows = json!({
        "metrics": [
            { "date": "2026-08-01", "channel": "search", "spend": 120.0, "revenue": 340.0,
              "impressions": 1000, "clicks": 50, "conversions": 5 },
            { "date": "2026-08-01", "channel": "social", "spend": 80.0, "revenue": 150.0 },
            { "date": "2026-08-02", "channel": "search", "spend": 110.0, "revenue": 310.0 },
        ]
    });
    let response = post_json(&app, &format!("/api/accounts/{account_id}/metrics"), rows).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["accepted"], 3);

    // Re-sending a row for the same channel and date replaces it.
    let replay = json!({
        "metrics": [
            { "date": "2026-08-01", "channel": "search", "spend": 999.0, "revenue": 1.0 },
        ]
    });
    let response = post_json(&app, &format!("/api/accounts/{account_id}/metrics"), replay).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["accepted"], 1);
}

#[tokio::test]
async fn test_ingest_for_unknown_account_is_404() {
    let app = test_app();

    let rows = json!({
        "metrics": [
            { "date": "2026-08-01", "channel": "search", "spend": 1.0, "revenue": 2.0 },
        ]
    });
    let response = post_json(&app, "/api/accounts/acct_ghost/metrics", rows).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_ingest_validation_names_the_offending_row() {
    let app = test_app();
    let account_id = create_account(&app, "Acme").await;

    let rows = json!({
        "metrics": [
            { "date": "2026-08-01", "channel": "search", "spend": 10.0, "revenue": 20.0 },
            { "date": "2026-08-02", "channel": "search", "spend": -4.0, "revenue": 20.0 },
        ]
    });
    let response = post_json(&app, &format!("/api/accounts/{account_id}/metrics"), rows).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_input");
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains("row 1"));

    let empty = json!({ "metrics": [] });
    let response = post_json(&app, &format!("/api/accounts/{account_id}/metrics"), empty).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_batches_are_rejected() {
    let app = test_app();
    let account_id = create_account(&app, "Acme").await;

    let rows: Vec<Value> = (0..501)
        .map(|i| {
            json!({
                "date": "2026-08-01",
                "channel": format!("channel_{i}"),
                "spend": 1.0,
                "revenue": 2.0,
            })
        })
        .collect();
    let response = post_json(
        &app,
        &format!("/api/accounts/{account_id}/metrics"),
        json!({ "metrics": rows }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "batch_too_large");
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains("500"));
}
