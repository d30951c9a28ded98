use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use mixlytics_core::job::{AttributionJobParams, Job, JobParams};
use mixlytics_core::metrics::MetricPoint;
use mixlytics_core::results::{AttributionResult, ConfidenceInterval};
use mixlytics_core::store::{AttributionStore, JobStore, MetricsStore};
use mixlytics_duckdb::DuckDbBackend;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn point(date: &str, channel: &str, spend: f64, revenue: f64) -> MetricPoint {
    MetricPoint {
        date: d(date),
        channel: channel.to_string(),
        spend,
        revenue,
        impressions: 1000,
        clicks: 50,
        conversions: 5,
        new_customers: 3,
        returning_customers: 2,
    }
}

fn attribution_fixture(r_squared: f64) -> AttributionResult {
    let per_channel = |v: f64| BTreeMap::from([("search".to_string(), v)]);
    AttributionResult {
        model_version: "ridge_v1".to_string(),
        r_squared,
        mape: 7.5,
        n_samples: 90,
        coefficients: per_channel(2.5),
        marginal_roas: per_channel(2.5),
        confidence_intervals: BTreeMap::from([(
            "search".to_string(),
            ConfidenceInterval {
                lower: 2.0,
                upper: 3.0,
            },
        )]),
        contributions: per_channel(9000.0),
        observed_spend: per_channel(40.0),
        degenerate_channels: Vec::new(),
    }
}

#[tokio::test]
async fn account_creation_is_idempotent() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.create_account("acct_1", "Acme").await.expect("create");
    db.create_account("acct_1", "Acme Renamed")
        .await
        .expect("recreate");
    assert!(db.account_exists("acct_1").await.expect("exists"));
    assert!(!db.account_exists("acct_2").await.expect("exists"));
}

#[tokio::test]
async fn upsert_replaces_on_channel_date_conflict() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.create_account("acct_1", "Acme").await.expect("create");

    let written = db
        .upsert_points(
            "acct_1",
            &[
                point("2026-01-01", "search", 10.0, 30.0),
                point("2026-01-02", "search", 12.0, 31.0),
                point("2026-01-01", "social", 5.0, 8.0),
            ],
        )
        .await
        .expect("upsert");
    assert_eq!(written, 3);

    // Re-sending a (channel, date) replaces the earlier row.
    db.upsert_points("acct_1", &[point("2026-01-01", "search", 11.0, 35.0)])
        .await
        .expect("upsert");

    let series = db
        .fetch_metrics("acct_1", d("2025-12-01"))
        .await
        .expect("fetch");
    assert_eq!(series.points.len(), 3);
    assert_eq!(series.points[0].channel, "search");
    assert_eq!(series.points[0].date, d("2026-01-01"));
    assert_eq!(series.points[0].spend, 11.0);
    assert_eq!(series.points[0].revenue, 35.0);
    assert_eq!(series.points[0].impressions, 1000);

    let windowed = db
        .fetch_metrics("acct_1", d("2026-01-02"))
        .await
        .expect("fetch");
    assert_eq!(windowed.points.len(), 1);

    // Unknown accounts come back empty; existence is the caller's check.
    let empty = db
        .fetch_metrics("acct_missing", d("2025-12-01"))
        .await
        .expect("fetch");
    assert!(empty.is_empty());
}

#[tokio::test]
async fn latest_attribution_wins() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let first = db
        .save_attribution("acct_1", &attribution_fixture(0.80), Duration::hours(1))
        .await
        .expect("save");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = db
        .save_attribution("acct_1", &attribution_fixture(0.90), Duration::hours(1))
        .await
        .expect("save");
    assert_ne!(first, second);

    let latest = db
        .load_latest_attribution("acct_1")
        .await
        .expect("load")
        .expect("present");
    assert_eq!(latest.id, second);
    assert_eq!(latest.account_id, "acct_1");
    assert!((latest.result.r_squared - 0.90).abs() < 1e-12);
    assert_eq!(latest.result.marginal_roas["search"], 2.5);
    assert!(latest.expires_at > latest.computed_at);

    assert!(db
        .load_latest_attribution("acct_other")
        .await
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn expired_attributions_are_not_served() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.save_attribution("acct_1", &attribution_fixture(0.85), Duration::hours(-1))
        .await
        .expect("save");
    assert!(db
        .load_latest_attribution("acct_1")
        .await
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn stores_dispatch_through_trait_objects() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let metrics: Arc<dyn MetricsStore> = db.clone();
    let jobs: Arc<dyn JobStore> = db.clone();

    metrics.create_account("acct_1", "Acme").await.expect("create");
    let job = Job::new(
        "acct_1",
        JobParams::Attribution(AttributionJobParams::default()),
    );
    jobs.insert(&job).await.expect("insert");
    assert!(jobs.get(&job.id).await.expect("get").is_some());
}
