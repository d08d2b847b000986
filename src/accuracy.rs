use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ACCURACY_EPSILON;
use crate::db::models::MatchedPair;
use crate::error::Result;
use crate::types::FuelMetric;

/// One prediction joined to its realized value, with both error measures.
#[derive(Debug, Clone, Serialize)]
pub struct AccuracyRecord {
    pub fuel_type: String,
    pub prediction_timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    pub actual_value: f64,
    pub absolute_error: f64,
    pub percentage_error: f64,
}

/// Per-fuel aggregate over every matched pair.
#[derive(Debug, Clone, Serialize)]
pub struct FuelAccuracySummary {
    pub fuel_type: String,
    pub predictions_matched: i64,
    pub mean_absolute_error: f64,
    pub mean_percentage_error: f64,
    pub worst_percentage_error: f64,
}

/// Absolute and percentage error for one matched pair. The percentage
/// denominator is floored at ACCURACY_EPSILON, so a zero actual yields a
/// huge but finite percentage instead of a division by zero.
pub fn prediction_errors(actual: f64, predicted: f64) -> (f64, f64) {
    let absolute = (actual - predicted).abs();
    let percentage = 100.0 * absolute / actual.abs().max(ACCURACY_EPSILON);
    (absolute, percentage)
}

const MATCHED_SQL: &str = r#"
SELECT p.fuel_type,
       p.prediction_timestamp,
       p.predicted_value,
       CAST(CASE p.fuel_type
            WHEN 'Overall_Intensity' THEN t.overall_intensity
            WHEN 'Wind' THEN t.fuel_wind_perc
            WHEN 'Solar' THEN t.fuel_solar_perc
            WHEN 'Gas' THEN t.fuel_gas_perc
            WHEN 'Nuclear' THEN t.fuel_nuclear_perc
       END AS REAL) AS actual_value
FROM grid_predictions p
JOIN grid_telemetry t ON t.timestamp = p.prediction_timestamp
WHERE p.fuel_type IN ('Overall_Intensity', 'Wind', 'Solar', 'Gas', 'Nuclear')
"#;

/// Predictions whose slot now has a realized reading, newest first.
/// Slots without telemetry yet are absent; being hour-normalized on both
/// sides, the join is plain equality.
pub async fn matched_records(
    pool: &sqlx::SqlitePool,
    fuel_type: Option<&str>,
    limit: i64,
) -> Result<Vec<AccuracyRecord>> {
    let pairs: Vec<MatchedPair> = if let Some(fuel) = fuel_type {
        let sql = format!("{MATCHED_SQL} AND p.fuel_type = ? ORDER BY p.prediction_timestamp DESC LIMIT ?");
        sqlx::query_as(&sql)
            .bind(fuel)
            .bind(limit)
            .fetch_all(pool)
            .await?
    } else {
        let sql = format!("{MATCHED_SQL} ORDER BY p.prediction_timestamp DESC LIMIT ?");
        sqlx::query_as(&sql).bind(limit).fetch_all(pool).await?
    };

    Ok(pairs.into_iter().map(record_from_pair).collect())
}

/// Per-fuel accuracy aggregates in metric order, skipping fuels with no
/// matched pairs yet.
pub async fn summary(pool: &sqlx::SqlitePool) -> Result<Vec<FuelAccuracySummary>> {
    let pairs: Vec<MatchedPair> = sqlx::query_as(MATCHED_SQL).fetch_all(pool).await?;

    let mut agg: HashMap<String, (i64, f64, f64, f64)> = HashMap::new();
    for pair in pairs {
        let (absolute, percentage) = prediction_errors(pair.actual_value, pair.predicted_value);
        let entry = agg.entry(pair.fuel_type).or_insert((0, 0.0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += absolute;
        entry.2 += percentage;
        entry.3 = entry.3.max(percentage);
    }

    let mut out = Vec::new();
    for metric in FuelMetric::ALL {
        let fuel = metric.to_string();
        if let Some(&(count, sum_abs, sum_pct, worst_pct)) = agg.get(&fuel) {
            out.push(FuelAccuracySummary {
                fuel_type: fuel,
                predictions_matched: count,
                mean_absolute_error: sum_abs / count as f64,
                mean_percentage_error: sum_pct / count as f64,
                worst_percentage_error: worst_pct,
            });
        }
    }
    Ok(out)
}

fn record_from_pair(pair: MatchedPair) -> AccuracyRecord {
    let (absolute_error, percentage_error) =
        prediction_errors(pair.actual_value, pair.predicted_value);
    AccuracyRecord {
        fuel_type: pair.fuel_type,
        prediction_timestamp: pair.prediction_timestamp,
        predicted_value: pair.predicted_value,
        actual_value: pair.actual_value,
        absolute_error,
        percentage_error,
    }
}
