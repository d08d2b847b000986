use crate::error::{AppError, Result};

pub const GRID_API_URL: &str = "https://api.carbonintensity.org.uk";
pub const MODEL_API_URL: &str = "https://api-inference.huggingface.co/models";

/// Delay in seconds after each failed fetch attempt. One attempt per entry,
/// so a dead endpoint costs 2+4+8 = 14s of backoff before the run fails
/// with a transient fetch error.
pub const FETCH_BACKOFF_SECS: &[u64] = &[2, 4, 8];

/// Per-request timeout for grid API calls (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Per-request timeout for external model calls (seconds).
pub const MODEL_TIMEOUT_SECS: u64 = 20;

/// Hard wall-clock budget for one whole forecast invocation (seconds).
pub const FORECAST_BUDGET_SECS: u64 = 30;

/// Most recent samples fed to the forecaster, oldest first.
pub const HISTORY_WINDOW: usize = 72;

/// Hours projected per metric per invocation.
pub const FORECAST_HORIZON: usize = 24;

/// Readings older than this relative to fetch time are rejected as stale.
pub const FRESHNESS_MAX_AGE_SECS: i64 = 7200;

/// Channel capacity for the forecast trigger queue.
pub const CHANNEL_CAPACITY: usize = 64;

/// External model ids tried in order until one produces a series.
pub const CANDIDATE_MODELS: &[&str] = &["amazon/chronos-t5-small", "amazon/chronos-t5-tiny"];

/// Ensemble weights applied when the external model produced a series.
pub mod blend_weights {
    pub const EXTERNAL: f64 = 0.7;
    pub const STATISTICAL: f64 = 0.3;
}

/// Noise amplitude as a fraction of series volatility.
pub const NOISE_SCALE: f64 = 0.3;

/// Divisor floor for percentage error when the actual is near zero.
pub const ACCURACY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub grid_api_url: String,
    /// Base URL for external model inference (MODEL_API_URL). Set empty to
    /// run on the statistical model alone.
    pub model_api_url: String,
    /// Bearer token for the model API (MODEL_API_TOKEN).
    pub model_api_token: Option<String>,
    pub log_level: String,
    pub api_port: u16,
    /// Fixed RNG seed for forecast noise (FORECAST_SEED). Unset draws from
    /// entropy.
    pub forecast_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "grid_etl.db".to_string()),
            grid_api_url: std::env::var("GRID_API_URL")
                .unwrap_or_else(|_| GRID_API_URL.to_string()),
            model_api_url: std::env::var("MODEL_API_URL")
                .unwrap_or_else(|_| MODEL_API_URL.to_string()),
            model_api_token: std::env::var("MODEL_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            forecast_seed: match std::env::var("FORECAST_SEED") {
                Ok(raw) => Some(raw.parse::<u64>().map_err(|_| {
                    AppError::Config("FORECAST_SEED must be an unsigned integer".to_string())
                })?),
                Err(_) => None,
            },
        })
    }
}
