use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use mixlytics_server::orchestrator::worker;
use mixlytics_server::state::AppState;

/// `mixlytics health` — liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$MIXLYTICS_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("MIXLYTICS_PORT").unwrap_or_else(|_| "8001".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Health-check subcommand — handled before anything else so the binary
    // stays fast when used as a Docker HEALTHCHECK probe.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mixlytics=info".parse()?),
        )
        .json()
        .init();

    let cfg = mixlytics_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/mixlytics.db", cfg.data_dir);

    // Open DuckDB (initialises the schema), then confirm the file is usable.
    let db = mixlytics_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;
    db.ping().await?;

    let state = Arc::new(AppState::new(db, cfg.clone()));

    // Seed a demo account so the server is usable out of the box.
    // The insert is an upsert, safe to run on every startup.
    if let Err(e) = state.metrics.create_account("acct_demo", "Demo Account").await {
        tracing::warn!(error = %e, "Failed to seed demo account");
    } else {
        info!("Demo account 'acct_demo' ready");
    }

    // Spawn the workers that drain the job queue.
    for worker_id in 0..cfg.worker_count {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            worker::run_worker_loop(state, worker_id).await;
        });
    }

    // Spawn the sweeper that times out and eventually drops overdue jobs.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            worker::run_sweeper_loop(state).await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = mixlytics_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, workers = cfg.worker_count, "Mixlytics listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    info!("Shutdown complete");
    Ok(())
}
