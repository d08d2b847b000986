mod accuracy;
mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod forecast;
mod pipeline;
mod seed;
mod types;
mod validator;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::api::{HealthState, LatencyStats};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::writer::PersistenceWriter;
use crate::error::{AppError, Result};
use crate::forecast::{run_invocation, ExternalModelClient, ForecastDispatcher};
use crate::pipeline::{run_once, RunContext};
use crate::types::TelemetryInserted;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let mode = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ingest".to_string());

    if let Err(e) = run(cfg, &mode).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, mode: &str) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let writer = Arc::new(PersistenceWriter::new(pool.clone()));
    let health = Arc::new(HealthState::new());
    health.set_db_ready(true);
    let latency = Arc::new(LatencyStats::new());

    let external = ExternalModelClient::from_config(&cfg, Arc::clone(&latency));
    if external.is_none() {
        warn!("MODEL_API_URL empty, forecasts run on the statistical model alone");
    }

    match mode {
        "ingest" => ingest(cfg, writer, health, latency, external).await,
        "serve" => serve(cfg, pool, writer, health, latency, external).await,
        "forecast" => forecast_latest(cfg, writer, external).await,
        "seed" => {
            seed::seed_day(&writer).await?;
            Ok(())
        }
        other => Err(AppError::Config(format!(
            "unknown mode '{other}' (expected ingest, serve, forecast or seed)"
        ))),
    }
}

/// One scheduled ingestion run. The forecast dispatcher drains before the
/// process exits with the run's code, so a triggered batch always lands.
async fn ingest(
    cfg: Config,
    writer: Arc<PersistenceWriter>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    external: Option<ExternalModelClient>,
) -> Result<()> {
    let (trigger_tx, trigger_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let dispatcher = ForecastDispatcher::new(
        Arc::clone(&writer),
        external,
        trigger_rx,
        latency,
        Arc::clone(&health),
        cfg.forecast_seed,
    );
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    let ctx = RunContext {
        cfg,
        writer,
        health,
        trigger_tx,
    };
    let report = run_once(&ctx).await;
    drop(ctx);

    if let Err(e) = dispatcher_handle.await {
        error!("dispatcher task panicked: {e}");
    }
    std::process::exit(report.exit_code());
}

/// Long-running webhook host: dispatcher in the background, axum in front.
async fn serve(
    cfg: Config,
    pool: sqlx::SqlitePool,
    writer: Arc<PersistenceWriter>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    external: Option<ExternalModelClient>,
) -> Result<()> {
    let (trigger_tx, trigger_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let dispatcher = ForecastDispatcher::new(
        Arc::clone(&writer),
        external,
        trigger_rx,
        Arc::clone(&latency),
        Arc::clone(&health),
        cfg.forecast_seed,
    );
    tokio::spawn(dispatcher.run());

    let state = ApiState {
        pool,
        trigger_tx,
        health,
        latency,
    };
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Manual re-trigger: one forecast invocation from the most recent
/// persisted sample, run to completion.
async fn forecast_latest(
    cfg: Config,
    writer: Arc<PersistenceWriter>,
    external: Option<ExternalModelClient>,
) -> Result<()> {
    let Some(row) = writer.latest_sample().await? else {
        warn!("no telemetry persisted yet, nothing to forecast");
        return Ok(());
    };
    let event = TelemetryInserted {
        row_id: row.id,
        timestamp: row.timestamp,
    };
    let rows = run_invocation(&writer, external.as_ref(), &event, cfg.forecast_seed).await?;
    info!(rows, row_id = row.id, "manual forecast complete");
    Ok(())
}
