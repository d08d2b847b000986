use chrono::{DateTime, Utc};

use crate::config::HISTORY_WINDOW;
use crate::error::Result;
use crate::types::FuelMetric;

/// Load up to HISTORY_WINDOW values of one metric at or before `as_of`,
/// oldest first. The column name comes from the FuelMetric enum, never from
/// caller input.
pub async fn history_window(
    pool: &sqlx::SqlitePool,
    metric: FuelMetric,
    as_of: DateTime<Utc>,
) -> Result<Vec<f64>> {
    let sql = format!(
        "SELECT CAST({} AS REAL) FROM grid_telemetry WHERE timestamp <= ? ORDER BY timestamp DESC LIMIT {}",
        metric.column(),
        HISTORY_WINDOW
    );
    let mut values: Vec<f64> = sqlx::query_scalar(&sql).bind(as_of).fetch_all(pool).await?;
    values.reverse();
    Ok(values)
}
