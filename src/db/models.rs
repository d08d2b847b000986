//! Row types matching the tables in schema.rs. Used by sqlx for typed
//! queries and serialized as-is by the read API.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TelemetryRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub overall_intensity: i64,
    pub fuel_gas_perc: f64,
    pub fuel_nuclear_perc: f64,
    pub fuel_wind_perc: f64,
    pub fuel_solar_perc: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub run_timestamp: DateTime<Utc>,
    pub status: String,
    pub rows_inserted: i64,
    pub execution_time_ms: i64,
    pub error_message: Option<String>,
}

/// A prediction joined to the realized value for the same slot.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MatchedPair {
    pub fuel_type: String,
    pub prediction_timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    pub actual_value: f64,
}
