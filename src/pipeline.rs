//! One end-to-end ingestion run: fetch, validate, deduplicate, persist,
//! trigger, audit. Every run leaves exactly one etl_runs row behind.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::HealthState;
use crate::config::Config;
use crate::db::writer::{PersistOutcome, PersistenceWriter};
use crate::error::{AppError, Result};
use crate::fetcher::{fetch_current, FetchOutcome};
use crate::types::{RunStatus, TelemetryInserted};
use crate::validator::validate;

/// Everything one ingestion run touches, built once at startup and passed
/// down explicitly instead of living in globals.
pub struct RunContext {
    pub cfg: Config,
    pub writer: Arc<PersistenceWriter>,
    pub health: Arc<HealthState>,
    pub trigger_tx: mpsc::Sender<TelemetryInserted>,
}

/// What one ingestion run did. The audit row is written from this.
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub rows_inserted: i64,
    pub error: Option<AppError>,
    /// Set when this run inserted a fresh row (and emitted a trigger).
    pub inserted: Option<TelemetryInserted>,
}

impl RunReport {
    fn failed(error: AppError) -> Self {
        Self {
            status: RunStatus::Failure,
            rows_inserted: 0,
            error: Some(error),
            inserted: None,
        }
    }

    fn finished(status: RunStatus, rows_inserted: i64, inserted: Option<TelemetryInserted>) -> Self {
        Self {
            status,
            rows_inserted,
            error: None,
            inserted,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match &self.error {
            Some(e) => i32::from(e.exit_code()),
            None => 0,
        }
    }
}

/// One ingestion run against the live upstream. Fetch time counts toward
/// the recorded execution time.
pub async fn run_once(ctx: &RunContext) -> RunReport {
    let started = Instant::now();
    let fetched = fetch_current(&ctx.cfg).await;
    complete_run(ctx, fetched, started).await
}

/// Everything after the fetch: validate, deduplicate, persist, emit the
/// forecast trigger, record the audit row.
pub async fn complete_run(
    ctx: &RunContext,
    fetched: Result<FetchOutcome>,
    started: Instant,
) -> RunReport {
    let report = evaluate(ctx, fetched).await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    let error_message = report.error.as_ref().map(|e| e.to_string());
    if let Err(audit_err) = ctx
        .writer
        .record_run(
            report.status,
            report.rows_inserted,
            elapsed_ms,
            error_message.as_deref(),
        )
        .await
    {
        error!(error = %audit_err, "failed to record run audit row");
    }

    match &report.error {
        Some(e) => error!(
            status = %report.status,
            elapsed_ms,
            error = %e,
            "ingestion run failed"
        ),
        None => info!(
            status = %report.status,
            rows_inserted = report.rows_inserted,
            elapsed_ms,
            "ingestion run finished"
        ),
    }
    report
}

async fn evaluate(ctx: &RunContext, fetched: Result<FetchOutcome>) -> RunReport {
    let raw = match fetched {
        Ok(FetchOutcome::Fetched(raw)) => raw,
        Ok(FetchOutcome::NoDataYet) => {
            info!("upstream has no reading for the current slot yet");
            return RunReport::finished(RunStatus::Partial, 0, None);
        }
        Err(e) => return RunReport::failed(e),
    };

    let sample = match validate(&raw, Utc::now()) {
        Ok(s) => s,
        Err(e) => return RunReport::failed(AppError::Validation(e)),
    };

    match ctx.writer.is_duplicate(sample.timestamp).await {
        Ok(true) => {
            info!(slot = %sample.timestamp, "slot already persisted, skipping");
            return RunReport::finished(RunStatus::Success, 0, None);
        }
        Ok(false) => {}
        Err(e) => return RunReport::failed(e),
    }

    match ctx.writer.persist(&sample).await {
        Ok(PersistOutcome::Duplicate) => {
            info!(slot = %sample.timestamp, "slot appeared mid-run, skipping");
            RunReport::finished(RunStatus::Success, 0, None)
        }
        Ok(PersistOutcome::Inserted(ev)) => {
            ctx.health.set_last_insert_at_ms(Utc::now().timestamp_millis());
            info!(row_id = ev.row_id, slot = %ev.timestamp, "telemetry persisted");
            match ctx.trigger_tx.try_send(ev) {
                Ok(()) => ctx.health.inc_triggers_enqueued(),
                Err(e) => {
                    ctx.health.inc_triggers_rejected();
                    warn!(error = %e, row_id = ev.row_id, "forecast trigger dropped");
                }
            }
            RunReport::finished(RunStatus::Success, 1, Some(ev))
        }
        Err(e) => RunReport::failed(e),
    }
}
