use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::api::{HealthState, LatencyStats};
use crate::config::FORECAST_BUDGET_SECS;
use crate::db::writer::PersistenceWriter;
use crate::error::{AppError, Result};
use crate::forecast::engine::run_forecast;
use crate::forecast::external::ExternalModelClient;
use crate::types::TelemetryInserted;
use crate::validator::normalize_hour;

/// Consumes insert triggers and spawns one bounded forecast invocation per
/// row. A row already being forecast is skipped, not queued again.
pub struct ForecastDispatcher {
    writer: Arc<PersistenceWriter>,
    external: Option<ExternalModelClient>,
    trigger_rx: mpsc::Receiver<TelemetryInserted>,
    in_flight: Arc<DashSet<i64>>,
    stats: Arc<LatencyStats>,
    health: Arc<HealthState>,
    /// Fixed seed for replayable runs. None draws a fresh seed per invocation.
    seed: Option<u64>,
}

impl ForecastDispatcher {
    pub fn new(
        writer: Arc<PersistenceWriter>,
        external: Option<ExternalModelClient>,
        trigger_rx: mpsc::Receiver<TelemetryInserted>,
        stats: Arc<LatencyStats>,
        health: Arc<HealthState>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            writer,
            external,
            trigger_rx,
            in_flight: Arc::new(DashSet::new()),
            stats,
            health,
            seed,
        }
    }

    /// Consume triggers until every sender is gone, then wait for the
    /// forecasts still in flight. Ingest mode relies on that drain to exit
    /// only after its forecast batch landed.
    pub async fn run(mut self) {
        let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();
        while let Some(event) = self.trigger_rx.recv().await {
            tasks.retain(|t| !t.is_finished());
            if let Some(handle) = self.dispatch(event) {
                tasks.push(handle);
            }
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("trigger channel closed, dispatcher exiting");
    }

    /// Spawns a forecast task for the event. None when the row is already
    /// in flight and the trigger is dropped.
    fn dispatch(&self, event: TelemetryInserted) -> Option<tokio::task::JoinHandle<()>> {
        if !self.in_flight.insert(event.row_id) {
            info!(
                row_id = event.row_id,
                "forecast already in flight for row, skipping trigger"
            );
            return None;
        }

        let writer = Arc::clone(&self.writer);
        let external = self.external.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let stats = Arc::clone(&self.stats);
        let health = Arc::clone(&self.health);
        let seed = self.seed;

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = run_invocation(&writer, external.as_ref(), &event, seed).await;
            stats.record_invocation(started.elapsed());

            match result {
                Ok(rows) => {
                    health.inc_forecasts_completed();
                    info!(
                        row_id = event.row_id,
                        rows,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "forecast invocation finished"
                    );
                }
                Err(e) => {
                    health.inc_forecasts_failed();
                    error!(row_id = event.row_id, error = %e, "forecast invocation failed");
                }
            }
            in_flight.remove(&event.row_id);
        });
        Some(handle)
    }
}

/// One full invocation under the wall-clock budget. On timeout nothing is
/// persisted, since the batch upsert only runs after every metric resolves.
/// Also the manual re-trigger entry point.
pub async fn run_invocation(
    writer: &PersistenceWriter,
    external: Option<&ExternalModelClient>,
    event: &TelemetryInserted,
    seed: Option<u64>,
) -> Result<usize> {
    let base_hour: DateTime<Utc> = normalize_hour(event.timestamp);
    let seed = seed.unwrap_or_else(rand::random::<u64>);

    match tokio::time::timeout(
        Duration::from_secs(FORECAST_BUDGET_SECS),
        run_forecast(writer, external, base_hour, seed),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(AppError::ForecastBudget(FORECAST_BUDGET_SECS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use crate::db::writer::PersistOutcome;
    use crate::types::TelemetrySample;
    use chrono::{Duration as ChronoDuration, TimeZone};

    async fn writer() -> Arc<PersistenceWriter> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        Arc::new(PersistenceWriter::new(pool))
    }

    fn dispatcher(
        writer: Arc<PersistenceWriter>,
    ) -> (ForecastDispatcher, mpsc::Sender<TelemetryInserted>) {
        let (tx, rx) = mpsc::channel(8);
        let d = ForecastDispatcher::new(
            writer,
            None,
            rx,
            Arc::new(LatencyStats::new()),
            Arc::new(HealthState::new()),
            Some(7),
        );
        (d, tx)
    }

    #[tokio::test]
    async fn in_flight_rows_are_not_redispatched() {
        let w = writer().await;
        let (d, _tx) = dispatcher(w);
        let event = TelemetryInserted {
            row_id: 42,
            timestamp: Utc.with_ymd_and_hms(2025, 12, 9, 10, 0, 0).unwrap(),
        };

        d.in_flight.insert(42);
        assert!(d.dispatch(event).is_none());
    }

    #[tokio::test]
    async fn fresh_rows_are_dispatched() {
        let w = writer().await;
        let (d, _tx) = dispatcher(w);
        let event = TelemetryInserted {
            row_id: 1,
            timestamp: Utc.with_ymd_and_hms(2025, 12, 9, 10, 0, 0).unwrap(),
        };
        let handle = d.dispatch(event).unwrap();
        handle.await.unwrap();
        assert!(!d.in_flight.contains(&1));
    }

    #[tokio::test]
    async fn trigger_produces_full_prediction_batch() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        let mut inserted = None;
        for i in 0..12i64 {
            let sample = TelemetrySample {
                timestamp: base + ChronoDuration::hours(i),
                overall_intensity: 100 + i,
                fuel_gas_perc: 40.0,
                fuel_nuclear_perc: 20.0,
                fuel_wind_perc: 25.0,
                fuel_solar_perc: 5.0,
            };
            if let PersistOutcome::Inserted(ev) = w.persist(&sample).await.unwrap() {
                inserted = Some(ev);
            }
        }
        let event = inserted.unwrap();

        let (d, tx) = dispatcher(Arc::clone(&w));
        let handle = tokio::spawn(d.run());
        tx.send(event).await.unwrap();
        drop(tx);
        // run() returns only after the spawned forecast drained.
        handle.await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM grid_predictions")
            .fetch_one(w.pool())
            .await
            .unwrap();
        assert_eq!(rows, 120);
    }
}
