use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::config::{blend_weights, FORECAST_HORIZON};
use crate::db::history::history_window;
use crate::db::writer::PersistenceWriter;
use crate::error::Result;
use crate::forecast::external::ExternalModelClient;
use crate::forecast::statistical::{smooth_series, StatisticalModel};
use crate::types::{ForecastSource, FuelMetric, MetricForecast};

/// Per-step ensemble of an external series with the statistical projection.
pub fn blend(external: &[f64], statistical: &[f64]) -> Vec<f64> {
    external
        .iter()
        .zip(statistical)
        .map(|(e, s)| blend_weights::EXTERNAL * e + blend_weights::STATISTICAL * s)
        .collect()
}

/// Clamp every value into the metric's domain. Non-finite values collapse
/// to the domain midpoint.
pub fn clamp_to_domain(metric: FuelMetric, values: &mut [f64]) {
    let (min, max) = metric.domain();
    for v in values.iter_mut() {
        if v.is_finite() {
            *v = v.clamp(min, max);
        } else {
            *v = (min + max) / 2.0;
        }
    }
}

/// Forecast one metric from its own history window. None when the metric
/// has no persisted history at all.
pub async fn forecast_metric(
    pool: &sqlx::SqlitePool,
    external: Option<&ExternalModelClient>,
    metric: FuelMetric,
    base_hour: DateTime<Utc>,
    seed: u64,
) -> Result<Option<MetricForecast>> {
    let history = history_window(pool, metric, base_hour).await?;
    if history.is_empty() {
        warn!(metric = %metric, "no history for metric, skipping");
        return Ok(None);
    }

    let smoothed = smooth_series(&history);
    let Some(model) = StatisticalModel::fit(&smoothed) else {
        return Ok(None);
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let statistical = model.project(FORECAST_HORIZON, &mut rng);

    let (source, mut values) = match external {
        Some(client) => match client.predict(&smoothed).await {
            Some(series) => (ForecastSource::External, blend(&series, &statistical)),
            None => (ForecastSource::Statistical, statistical),
        },
        None => (ForecastSource::Statistical, statistical),
    };
    clamp_to_domain(metric, &mut values);

    Ok(Some(MetricForecast {
        metric,
        source,
        values,
    }))
}

/// One forecast invocation: all five metrics concurrently, then a single
/// transactional upsert of every produced row. Metric seeds are derived
/// from the invocation seed, so a fixed FORECAST_SEED replays identically.
pub async fn run_forecast(
    writer: &PersistenceWriter,
    external: Option<&ExternalModelClient>,
    base_hour: DateTime<Utc>,
    seed: u64,
) -> Result<usize> {
    let tasks = FuelMetric::ALL.iter().enumerate().map(|(idx, &metric)| {
        let metric_seed = seed ^ (idx as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        forecast_metric(writer.pool(), external, metric, base_hour, metric_seed)
    });
    let results = join_all(tasks).await;

    let mut forecasts = Vec::new();
    for result in results {
        if let Some(forecast) = result? {
            forecasts.push(forecast);
        }
    }
    if forecasts.is_empty() {
        warn!("no metric had history, nothing to persist");
        return Ok(0);
    }

    let rows = writer.persist_predictions(base_hour, &forecasts).await?;
    info!(
        rows,
        metrics = forecasts.len(),
        base_hour = %base_hour,
        "forecast batch persisted"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use crate::types::TelemetrySample;
    use chrono::{Duration, TimeZone};

    async fn writer() -> PersistenceWriter {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        PersistenceWriter::new(pool)
    }

    fn sample_at(slot: DateTime<Utc>, wind: f64) -> TelemetrySample {
        TelemetrySample {
            timestamp: slot,
            overall_intensity: 150,
            fuel_gas_perc: 40.0,
            fuel_nuclear_perc: 20.0,
            fuel_wind_perc: wind,
            fuel_solar_perc: 5.0,
        }
    }

    #[test]
    fn blend_weights_external_heavier() {
        let blended = blend(&[10.0, 20.0], &[0.0, 10.0]);
        assert_eq!(blended, vec![7.0, 17.0]);
    }

    #[test]
    fn clamp_respects_metric_domains() {
        let mut intensity = vec![1234.5, -3.0, f64::NAN];
        clamp_to_domain(FuelMetric::OverallIntensity, &mut intensity);
        assert_eq!(intensity, vec![1000.0, 0.0, 500.0]);

        let mut wind = vec![150.0, f64::INFINITY, 42.0];
        clamp_to_domain(FuelMetric::Wind, &mut wind);
        assert_eq!(wind, vec![100.0, 50.0, 42.0]);
    }

    #[tokio::test]
    async fn constant_history_projects_exactly() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        for i in 0..12i64 {
            w.persist(&sample_at(base + Duration::hours(i), 25.0))
                .await
                .unwrap();
        }

        let forecast = forecast_metric(
            w.pool(),
            None,
            FuelMetric::Wind,
            base + Duration::hours(11),
            9,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(forecast.source, ForecastSource::Statistical);
        assert_eq!(forecast.values.len(), FORECAST_HORIZON);
        assert!(forecast.values.iter().all(|v| *v == 25.0));
    }

    #[tokio::test]
    async fn empty_history_skips_metric() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        let forecast = forecast_metric(w.pool(), None, FuelMetric::Solar, base, 9)
            .await
            .unwrap();
        assert!(forecast.is_none());
    }

    #[tokio::test]
    async fn full_run_writes_all_metrics() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        for i in 0..12i64 {
            w.persist(&sample_at(base + Duration::hours(i), 20.0 + i as f64))
                .await
                .unwrap();
        }

        let rows = run_forecast(&w, None, base + Duration::hours(11), 42)
            .await
            .unwrap();
        assert_eq!(rows, 5 * FORECAST_HORIZON);

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM grid_predictions")
            .fetch_one(w.pool())
            .await
            .unwrap();
        assert_eq!(n, rows as i64);
    }

    #[tokio::test]
    async fn rerun_with_same_seed_is_idempotent() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        for i in 0..12i64 {
            w.persist(&sample_at(base + Duration::hours(i), 20.0 + i as f64))
                .await
                .unwrap();
        }
        let as_of = base + Duration::hours(11);

        run_forecast(&w, None, as_of, 42).await.unwrap();
        let first: Vec<f64> = sqlx::query_scalar(
            "SELECT predicted_value FROM grid_predictions ORDER BY fuel_type, prediction_timestamp",
        )
        .fetch_all(w.pool())
        .await
        .unwrap();

        run_forecast(&w, None, as_of, 42).await.unwrap();
        let second: Vec<f64> = sqlx::query_scalar(
            "SELECT predicted_value FROM grid_predictions ORDER BY fuel_type, prediction_timestamp",
        )
        .fetch_all(w.pool())
        .await
        .unwrap();

        assert_eq!(first.len(), 5 * FORECAST_HORIZON);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_database_persists_nothing() {
        let w = writer().await;
        let base = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        let rows = run_forecast(&w, None, base, 1).await.unwrap();
        assert_eq!(rows, 0);

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM grid_predictions")
            .fetch_one(w.pool())
            .await
            .unwrap();
        assert_eq!(n, 0);
    }
}
