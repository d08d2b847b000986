use chrono::{DateTime, Duration, Utc};

use crate::db::models::TelemetryRow;
use crate::error::Result;
use crate::types::{MetricForecast, RunStatus, TelemetryInserted, TelemetrySample};

/// Outcome of a telemetry persist attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PersistOutcome {
    Inserted(TelemetryInserted),
    /// The slot was already present when the transaction re-checked.
    Duplicate,
}

/// Owns every write to SQLite. Telemetry inserts and prediction batches run
/// inside transactions; audit rows are plain appends.
pub struct PersistenceWriter {
    pool: sqlx::SqlitePool,
}

impl PersistenceWriter {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    /// Duplicate probe outside any transaction. Cheap pre-check; persist
    /// repeats it transactionally.
    pub async fn is_duplicate(&self, slot: DateTime<Utc>) -> Result<bool> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM grid_telemetry WHERE timestamp = ?")
                .bind(slot)
                .fetch_optional(&self.pool)
                .await?;
        Ok(existing.is_some())
    }

    /// Insert one validated sample. The duplicate check runs again inside
    /// the transaction so a row that appeared since the probe becomes a
    /// clean Duplicate; two truly simultaneous inserts are settled by the
    /// UNIQUE constraint and the loser gets a database error.
    pub async fn persist(&self, sample: &TelemetrySample) -> Result<PersistOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM grid_telemetry WHERE timestamp = ?")
                .bind(sample.timestamp)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Ok(PersistOutcome::Duplicate);
        }

        let row_id = sqlx::query(
            r#"
            INSERT INTO grid_telemetry (
                timestamp, overall_intensity,
                fuel_gas_perc, fuel_nuclear_perc, fuel_wind_perc, fuel_solar_perc,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.timestamp)
        .bind(sample.overall_intensity)
        .bind(sample.fuel_gas_perc)
        .bind(sample.fuel_nuclear_perc)
        .bind(sample.fuel_wind_perc)
        .bind(sample.fuel_solar_perc)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(PersistOutcome::Inserted(TelemetryInserted {
            row_id,
            timestamp: sample.timestamp,
        }))
    }

    /// Upsert a whole forecast batch in one transaction: all rows or none.
    /// Re-running a forecast for the same trigger hour replaces its rows
    /// instead of stacking duplicates. Returns the number of rows written.
    pub async fn persist_predictions(
        &self,
        base_hour: DateTime<Utc>,
        forecasts: &[MetricForecast],
    ) -> Result<usize> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut rows = 0usize;

        for forecast in forecasts {
            let fuel_type = forecast.metric.to_string();
            for (i, value) in forecast.values.iter().enumerate() {
                let slot = base_hour + Duration::hours(i as i64 + 1);
                sqlx::query(
                    r#"
                    INSERT INTO grid_predictions (fuel_type, predicted_value, prediction_timestamp, created_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(fuel_type, prediction_timestamp) DO UPDATE SET
                        predicted_value = excluded.predicted_value,
                        created_at = excluded.created_at
                    "#,
                )
                .bind(&fuel_type)
                .bind(*value)
                .bind(slot)
                .bind(created_at)
                .execute(&mut *tx)
                .await?;
                rows += 1;
            }
        }

        tx.commit().await?;
        Ok(rows)
    }

    /// Append the audit row for a finished run.
    pub async fn record_run(
        &self,
        status: RunStatus,
        rows_inserted: i64,
        execution_time_ms: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO etl_runs (run_timestamp, status, rows_inserted, execution_time_ms, error_message)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now())
        .bind(status.to_string())
        .bind(rows_inserted)
        .bind(execution_time_ms)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent persisted reading, if any.
    pub async fn latest_sample(&self) -> Result<Option<TelemetryRow>> {
        let row = sqlx::query_as::<_, TelemetryRow>(
            r#"
            SELECT id, timestamp, overall_intensity,
                   fuel_gas_perc, fuel_nuclear_perc, fuel_wind_perc, fuel_solar_perc
            FROM grid_telemetry
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use crate::types::{ForecastSource, FuelMetric};
    use chrono::TimeZone;

    // One connection: each sqlite::memory: connection is its own database.
    async fn writer() -> PersistenceWriter {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        PersistenceWriter::new(pool)
    }

    fn sample(hour: u32) -> TelemetrySample {
        TelemetrySample {
            timestamp: Utc.with_ymd_and_hms(2025, 12, 9, hour, 0, 0).unwrap(),
            overall_intensity: 150 + hour as i64,
            fuel_gas_perc: 30.0,
            fuel_nuclear_perc: 20.0,
            fuel_wind_perc: 25.0,
            fuel_solar_perc: 5.0,
        }
    }

    #[tokio::test]
    async fn second_persist_of_same_slot_is_duplicate() {
        let w = writer().await;
        let s = sample(14);

        let first = w.persist(&s).await.unwrap();
        assert!(matches!(first, PersistOutcome::Inserted(_)));

        let second = w.persist(&s).await.unwrap();
        assert_eq!(second, PersistOutcome::Duplicate);

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM grid_telemetry")
            .fetch_one(w.pool())
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn duplicate_probe_sees_existing_slot() {
        let w = writer().await;
        let s = sample(14);

        assert!(!w.is_duplicate(s.timestamp).await.unwrap());
        w.persist(&s).await.unwrap();
        assert!(w.is_duplicate(s.timestamp).await.unwrap());
        assert!(!w.is_duplicate(sample(15).timestamp).await.unwrap());
    }

    #[tokio::test]
    async fn inserted_event_carries_slot_and_row_id() {
        let w = writer().await;
        let s = sample(9);
        match w.persist(&s).await.unwrap() {
            PersistOutcome::Inserted(ev) => {
                assert_eq!(ev.timestamp, s.timestamp);
                assert!(ev.row_id > 0);
            }
            PersistOutcome::Duplicate => panic!("fresh slot reported duplicate"),
        }
    }

    #[tokio::test]
    async fn prediction_rerun_replaces_rows() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 14, 0, 0).unwrap();

        let first = vec![MetricForecast {
            metric: FuelMetric::Wind,
            source: ForecastSource::Statistical,
            values: vec![10.0, 11.0, 12.0],
        }];
        let second = vec![MetricForecast {
            metric: FuelMetric::Wind,
            source: ForecastSource::Statistical,
            values: vec![20.0, 21.0, 22.0],
        }];

        assert_eq!(w.persist_predictions(base, &first).await.unwrap(), 3);
        assert_eq!(w.persist_predictions(base, &second).await.unwrap(), 3);

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM grid_predictions")
            .fetch_one(w.pool())
            .await
            .unwrap();
        assert_eq!(n, 3);

        let v: f64 = sqlx::query_scalar(
            "SELECT predicted_value FROM grid_predictions WHERE fuel_type = ? AND prediction_timestamp = ?",
        )
        .bind("Wind")
        .bind(base + Duration::hours(1))
        .fetch_one(w.pool())
        .await
        .unwrap();
        assert_eq!(v, 20.0);
    }

    #[tokio::test]
    async fn prediction_slots_start_one_hour_after_base() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 14, 0, 0).unwrap();

        let batch = vec![MetricForecast {
            metric: FuelMetric::Gas,
            source: ForecastSource::External,
            values: vec![40.0, 41.0],
        }];
        w.persist_predictions(base, &batch).await.unwrap();

        let slots: Vec<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT prediction_timestamp FROM grid_predictions ORDER BY prediction_timestamp",
        )
        .fetch_all(w.pool())
        .await
        .unwrap();
        assert_eq!(
            slots,
            vec![base + Duration::hours(1), base + Duration::hours(2)]
        );
    }

    #[tokio::test]
    async fn run_audit_rows_append() {
        let w = writer().await;
        w.record_run(RunStatus::Success, 1, 250, None).await.unwrap();
        w.record_run(RunStatus::Failure, 0, 90, Some("Fetch error: HTTP 400"))
            .await
            .unwrap();

        let statuses: Vec<String> =
            sqlx::query_scalar("SELECT status FROM etl_runs ORDER BY id")
                .fetch_all(w.pool())
                .await
                .unwrap();
        assert_eq!(statuses, vec!["success", "failure"]);
    }

    #[tokio::test]
    async fn latest_sample_orders_by_slot() {
        let w = writer().await;
        w.persist(&sample(9)).await.unwrap();
        w.persist(&sample(14)).await.unwrap();
        w.persist(&sample(11)).await.unwrap();

        let latest = w.latest_sample().await.unwrap().unwrap();
        assert_eq!(
            latest.timestamp,
            Utc.with_ymd_and_hms(2025, 12, 9, 14, 0, 0).unwrap()
        );
    }
}
