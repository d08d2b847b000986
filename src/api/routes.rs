use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::accuracy::{self, AccuracyRecord, FuelAccuracySummary};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::db::models::RunRow;
use crate::error::AppError;
use crate::types::TelemetryInserted;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub trigger_tx: mpsc::Sender<TelemetryInserted>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/hooks/telemetry", post(post_telemetry_hook))
        .route("/health", get(get_health))
        .route("/runs", get(get_runs))
        .route("/accuracy", get(get_accuracy))
        .route("/accuracy/summary", get(get_accuracy_summary))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct AccuracyQuery {
    pub fuel_type: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub db_ready: bool,
    pub last_insert_at_ms: i64,
    pub triggers_enqueued: u64,
    pub triggers_rejected: u64,
    pub forecasts_completed: u64,
    pub forecasts_failed: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Webhook receiver for insert notifications. 202 once the trigger is on
/// the queue; 503 when the queue is full (the sender should redeliver).
async fn post_telemetry_hook(
    State(state): State<ApiState>,
    Json(event): Json<TelemetryInserted>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.trigger_tx.try_send(event) {
        Ok(()) => {
            state.health.inc_triggers_enqueued();
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "status": "queued", "row_id": event.row_id })),
            )
        }
        Err(_) => {
            state.health.inc_triggers_rejected();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "queue_full" })),
            )
        }
    }
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        db_ready: state.health.db_ready(),
        last_insert_at_ms: state.health.last_insert_at_ms(),
        triggers_enqueued: state.health.triggers_enqueued(),
        triggers_rejected: state.health.triggers_rejected(),
        forecasts_completed: state.health.forecasts_completed(),
        forecasts_failed: state.health.forecasts_failed(),
    })
}

async fn get_runs(
    State(state): State<ApiState>,
    Query(params): Query<RunsQuery>,
) -> Result<Json<Vec<RunRow>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let rows = if let Some(status) = &params.status {
        sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, run_timestamp, status, rows_inserted, execution_time_ms, error_message
            FROM etl_runs
            WHERE status = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&state.pool)
        .await?
    } else {
        sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, run_timestamp, status, rows_inserted, execution_time_ms, error_message
            FROM etl_runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&state.pool)
        .await?
    };

    Ok(Json(rows))
}

async fn get_accuracy(
    State(state): State<ApiState>,
    Query(params): Query<AccuracyQuery>,
) -> Result<Json<Vec<AccuracyRecord>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let records =
        accuracy::matched_records(&state.pool, params.fuel_type.as_deref(), limit).await?;
    Ok(Json(records))
}

async fn get_accuracy_summary(
    State(state): State<ApiState>,
) -> Result<Json<Vec<FuelAccuracySummary>>, AppError> {
    let summaries = accuracy::summary(&state.pool).await?;
    Ok(Json(summaries))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let (model_count, model_p50, model_p95, model_p99) = state.latency.model_percentiles();
    let (inv_count, inv_p50, inv_p95, inv_p99) = state.latency.invocation_percentiles();
    Json(serde_json::json!({
        "model_call_ms": {
            "count": model_count, "p50": model_p50, "p95": model_p95, "p99": model_p99
        },
        "invocation_ms": {
            "count": inv_count, "p50": inv_p50, "p95": inv_p95, "p99": inv_p99
        }
    }))
}
