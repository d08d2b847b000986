use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::validator::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Fetch failed after retries: {0}")]
    TransientFetch(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Forecast budget of {0}s exhausted")]
    ForecastBudget(u64),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Exit code for the ingest entry point. Zero is success; each failure
    /// class maps to its own non-zero code.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Validation(_) => 2,
            AppError::Database(_) => 3,
            AppError::TransientFetch(_) | AppError::Fetch(_) => 4,
            _ => 1,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ChannelSend(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
