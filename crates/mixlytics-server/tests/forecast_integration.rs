use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
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

/// Success payloads arrive under a `data` envelope.
async fn json_data(response: axum::http::Response<Body>) -> Value {
    let mut body = json_body(response).await;
    body["data"].take()
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

async fn get(app: &Router, uri: &str) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn create_account(app: &Router, name: &str) -> String {
    let response = post_json(app, "/api/accounts", json!({ "name": name })).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_data(response).await["account_id"]
        .as_str()
        .expect("account id")
        .to_string()
}

/// Single channel, sinusoidal spend, revenue tied to spend with a gentle
/// upward drift.
async fn ingest_history(app: &Router, account_id: &str, days: i64) {
    let today = Utc::now().date_naive();
    let rows: Vec<Value> = (0..days)
        .map(|i| {
            let date = (today - chrono::Duration::days(days - i)).to_string();
            let spend = 100.0 + 20.0 * ((i as f64) / 7.0).sin();
            json!({
                "date": date, "channel": "search",
                "spend": spend, "revenue": spend * 3.0 + 50.0 + 0.5 * i as f64,
            })
        })
        .collect();
    let response = post_json(
        app,
        &format!("/api/accounts/{account_id}/metrics"),
        json!({ "metrics": rows }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================
// BDD: A forecast has one row per day and widening intervals
// ============================================================
#[tokio::test]
async fn test_forecast_shape_and_intervals() {
    let app = test_app();
    let account_id = create_account(&app, "Acme").await;
    ingest_history(&app, &account_id, 60).await;

    let response = get(
        &app,
        &format!("/api/accounts/{account_id}/forecast?horizon_days=14"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_data(response).await;
    assert_eq!(body["horizon_days"], 14);
    let days = body["days"].as_array().expect("days");
    assert_eq!(days.len(), 14);
    for day in days {
        let lower = day["lower"].as_f64().expect("lower");
        let expected = day["expected"].as_f64().expect("expected");
        let upper = day["upper"].as_f64().expect("upper");
        assert!(lower <= expected && expected <= upper);
    }
    let first_width = days[0]["upper"].as_f64().expect("w") - days[0]["lower"].as_f64().expect("w");
    let last_width = days[13]["upper"].as_f64().expect("w") - days[13]["lower"].as_f64().expect("w");
    assert!(last_width >= first_width);

    assert!(body["total_expected"].as_f64().expect("total") > 0.0);
    assert_eq!(body["trend"], "increasing");
    assert_eq!(body["weekly_seasonality"].as_array().expect("dow").len(), 7);
    assert_eq!(body["warnings"].as_array().expect("warnings").len(), 0);
}

// ============================================================
// BDD: Horizon is bounded inclusively on both ends
// ============================================================
#[tokio::test]
async fn test_horizon_bounds_are_enforced() {
    let app = test_app();
    let account_id = create_account(&app, "Acme").await;
    ingest_history(&app, &account_id, 60).await;

    for bad in [6, 91] {
        let response = get(
            &app,
            &format!("/api/accounts/{account_id}/forecast?horizon_days={bad}"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "horizon {bad}");
        assert_eq!(json_body(response).await["error"]["code"], "invalid_input");
    }

    for ok in [7usize, 90] {
        let response = get(
            &app,
            &format!("/api/accounts/{account_id}/forecast?horizon_days={ok}"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "horizon {ok}");
        let body = json_data(response).await;
        assert_eq!(body["days"].as_array().expect("days").len(), ok);
    }
}

// ============================================================
// BDD: Spend scenarios move the forecast
// ============================================================
#[tokio::test]
async fn test_scenario_spend_shifts_the_forecast() {
    let app = test_app();
    let account_id = create_account(&app, "Acme").await;
    ingest_history(&app, &account_id, 60).await;

    let response = get(
        &app,
        &format!("/api/accounts/{account_id}/forecast?horizon_days=14"),
    )
    .await;
    let baseline = json_data(response).await["total_expected"]
        .as_f64()
        .expect("baseline");

    // Triple the spend; a single value repeats across the horizon.
    let response = post_json(
        &app,
        &format!("/api/accounts/{account_id}/forecast"),
        json!({ "horizon_days": 14, "future_spend": { "search": [300.0] } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let scenario = json_data(response).await;
    assert!(
        scenario["total_expected"].as_f64().expect("scenario") > baseline,
        "tripled spend should raise the forecast"
    );

    // Unknown channels are ignored with a warning, not an error.
    let response = post_json(
        &app,
        &format!("/api/accounts/{account_id}/forecast"),
        json!({ "horizon_days": 14, "future_spend": { "podcasts": [500.0] } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_data(response).await;
    assert!(body["warnings"]
        .as_array()
        .expect("warnings")
        .iter()
        .any(|w| w.as_str().expect("warning").contains("podcasts")));

    // Negative scenario spend is rejected.
    let response = post_json(
        &app,
        &format!("/api/accounts/{account_id}/forecast"),
        json!({ "horizon_days": 14, "future_spend": { "search": [-10.0] } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "invalid_input");
}

// ============================================================
// BDD: History requirements are typed errors
// ============================================================
#[tokio::test]
async fn test_forecast_requires_history() {
    let app = test_app();

    let empty = create_account(&app, "Empty").await;
    let response = get(&app, &format!("/api/accounts/{empty}/forecast")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "prerequisite_missing"
    );

    let sparse = create_account(&app, "Sparse").await;
    ingest_history(&app, &sparse, 10).await;
    let response = get(&app, &format!("/api/accounts/{sparse}/forecast")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "insufficient_data"
    );
}

#[tokio::test]
async fn test_short_history_warns_but_forecasts() {
    let app = test_app();
    let account_id = create_account(&app, "Young").await;
    ingest_history(&app, &account_id, 20).await;

    let response = get(&app, &format!("/api/accounts/{account_id}/forecast")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_data(response).await;
    assert!(body["warnings"]
        .as_array()
        .expect("warnings")
        .iter()
        .any(|w| w.as_str().expect("warning").contains("20 days")));
}

#[tokio::test]
async fn test_forecast_for_unknown_account_is_404() {
    let app = test_app();
    let response = get(&app, "/api/accounts/acct_ghost/forecast").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
