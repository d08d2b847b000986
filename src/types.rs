use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fuel metrics
// ---------------------------------------------------------------------------

/// The five forecastable series. Display output matches the fuel_type
/// strings stored in grid_predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuelMetric {
    OverallIntensity,
    Wind,
    Solar,
    Gas,
    Nuclear,
}

impl FuelMetric {
    pub const ALL: [FuelMetric; 5] = [
        FuelMetric::OverallIntensity,
        FuelMetric::Wind,
        FuelMetric::Solar,
        FuelMetric::Gas,
        FuelMetric::Nuclear,
    ];

    /// Column of grid_telemetry holding this metric's actuals.
    pub fn column(self) -> &'static str {
        match self {
            FuelMetric::OverallIntensity => "overall_intensity",
            FuelMetric::Wind => "fuel_wind_perc",
            FuelMetric::Solar => "fuel_solar_perc",
            FuelMetric::Gas => "fuel_gas_perc",
            FuelMetric::Nuclear => "fuel_nuclear_perc",
        }
    }

    /// Inclusive range forecast values are clamped to.
    pub fn domain(self) -> (f64, f64) {
        match self {
            FuelMetric::OverallIntensity => (0.0, 1000.0),
            _ => (0.0, 100.0),
        }
    }
}

impl std::fmt::Display for FuelMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FuelMetric::OverallIntensity => "Overall_Intensity",
            FuelMetric::Wind => "Wind",
            FuelMetric::Solar => "Solar",
            FuelMetric::Gas => "Gas",
            FuelMetric::Nuclear => "Nuclear",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Run audit
// ---------------------------------------------------------------------------

/// Outcome class of one ingestion run, stored in etl_runs.status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Run completed; a row was inserted or the slot already existed.
    Success,
    /// Run completed but the upstream had no reading for the slot yet.
    Partial,
    /// Run aborted; etl_runs.error_message carries the cause.
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// One reading as fetched, before validation. Every field is optional: the
/// upstream omits or nulls them freely and the validator decides what each
/// absence means.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSample {
    pub timestamp: Option<String>,
    pub overall_intensity: Option<f64>,
    pub fuel_gas_perc: Option<f64>,
    pub fuel_nuclear_perc: Option<f64>,
    pub fuel_wind_perc: Option<f64>,
    pub fuel_solar_perc: Option<f64>,
}

/// A validated reading, hour-normalized and ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    /// Top-of-hour slot the reading belongs to.
    pub timestamp: DateTime<Utc>,
    /// gCO2 per kWh. Integral by upstream contract.
    pub overall_intensity: i64,
    pub fuel_gas_perc: f64,
    pub fuel_nuclear_perc: f64,
    pub fuel_wind_perc: f64,
    pub fuel_solar_perc: f64,
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

/// Provenance of a projected series. External output is blended with the
/// statistical projection; Statistical alone means every candidate model
/// failed or the external API is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastSource {
    External,
    Statistical,
}

impl std::fmt::Display for ForecastSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForecastSource::External => write!(f, "external"),
            ForecastSource::Statistical => write!(f, "statistical"),
        }
    }
}

/// One metric's hourly projection plus its provenance tag. Index i maps to
/// trigger hour + (i+1) hours.
#[derive(Debug, Clone)]
pub struct MetricForecast {
    pub metric: FuelMetric,
    pub source: ForecastSource,
    pub values: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Channel message types
// ---------------------------------------------------------------------------

/// Emitted after a successful telemetry insert and consumed by the forecast
/// dispatcher. Carries just enough to re-query history; also the payload of
/// POST /hooks/telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryInserted {
    pub row_id: i64,
    /// Top-of-hour slot of the inserted reading.
    pub timestamp: DateTime<Utc>,
}
