use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::api::latency::LatencyStats;
use crate::config::{Config, CANDIDATE_MODELS, FORECAST_HORIZON, MODEL_TIMEOUT_SECS};

/// Request body for a hosted time-series inference call.
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a [f64],
    parameters: InferenceParams,
}

#[derive(Debug, Serialize)]
struct InferenceParams {
    prediction_length: usize,
}

/// Tries each candidate model in order until one returns a usable series.
/// Every per-model failure (timeout, error status, still-loading, short or
/// malformed body) falls through to the next candidate; the caller falls
/// back to the statistical model once the list is exhausted.
#[derive(Clone)]
pub struct ExternalModelClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    stats: Arc<LatencyStats>,
}

impl ExternalModelClient {
    /// None when MODEL_API_URL is set empty (external model disabled) or the
    /// HTTP client cannot be built.
    pub fn from_config(cfg: &Config, stats: Arc<LatencyStats>) -> Option<Self> {
        if cfg.model_api_url.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(MODEL_TIMEOUT_SECS))
            .build()
            .ok()?;
        Some(Self {
            client,
            base_url: cfg.model_api_url.trim_end_matches('/').to_string(),
            token: cfg.model_api_token.clone(),
            stats,
        })
    }

    /// One series of FORECAST_HORIZON values, or None when every candidate
    /// declined.
    pub async fn predict(&self, history: &[f64]) -> Option<Vec<f64>> {
        for model in CANDIDATE_MODELS {
            let started = Instant::now();
            let outcome = self.call_model(model, history).await;
            self.stats.record_model_call(started.elapsed());
            match outcome {
                Ok(values) => {
                    debug!(model, "external model answered");
                    return Some(values);
                }
                Err(reason) => {
                    warn!(model, "external model unusable: {reason}");
                }
            }
        }
        None
    }

    async fn call_model(
        &self,
        model: &str,
        history: &[f64],
    ) -> std::result::Result<Vec<f64>, String> {
        let url = format!("{}/{model}", self.base_url);
        let body = InferenceRequest {
            inputs: history,
            parameters: InferenceParams {
                prediction_length: FORECAST_HORIZON,
            },
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| e.to_string())?;

        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE || looks_like_loading(&text) {
            return Err(format!("model still loading (HTTP {status})"));
        }
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let values =
            parse_series(&text).ok_or_else(|| "no numeric series in response".to_string())?;
        if values.len() < FORECAST_HORIZON {
            return Err(format!(
                "series too short: {} < {FORECAST_HORIZON}",
                values.len()
            ));
        }
        Ok(values[..FORECAST_HORIZON].to_vec())
    }
}

/// Inference hosts report cold models with bodies like
/// `{"error":"Model X is currently loading","estimated_time":20.0}`.
fn looks_like_loading(body: &str) -> bool {
    let Ok(v) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    if v.get("estimated_time").is_some() {
        return true;
    }
    v.get("error")
        .and_then(|e| e.as_str())
        .map(|e| e.to_ascii_lowercase().contains("loading"))
        .unwrap_or(false)
}

/// Accepts a bare numeric array or any object/array nesting one; the first
/// all-numeric array found wins.
pub fn parse_series(body: &str) -> Option<Vec<f64>> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    find_numeric_array(&v)
}

fn find_numeric_array(v: &serde_json::Value) -> Option<Vec<f64>> {
    match v {
        serde_json::Value::Array(items) => {
            if !items.is_empty() && items.iter().all(|i| i.is_number()) {
                return Some(items.iter().filter_map(|i| i.as_f64()).collect());
            }
            items.iter().find_map(find_numeric_array)
        }
        serde_json::Value::Object(map) => map.values().find_map(find_numeric_array),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_parses() {
        let values = parse_series("[1.5, 2.0, 3.25]").unwrap();
        assert_eq!(values, vec![1.5, 2.0, 3.25]);
    }

    #[test]
    fn nested_forecast_field_parses() {
        let body = r#"{"forecast": {"values": [10, 11, 12]}}"#;
        assert_eq!(parse_series(body).unwrap(), vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn outer_array_of_objects_parses() {
        let body = r#"[{"generated": [4.0, 5.0]}]"#;
        assert_eq!(parse_series(body).unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn mixed_array_is_rejected() {
        assert!(parse_series(r#"[1.0, "x", 3.0]"#).is_none());
        assert!(parse_series(r#"{"error": "bad input"}"#).is_none());
    }

    #[test]
    fn loading_bodies_are_detected() {
        assert!(looks_like_loading(
            r#"{"error": "Model amazon/chronos-t5-small is currently loading", "estimated_time": 20.0}"#
        ));
        assert!(looks_like_loading(r#"{"error": "Loading model"}"#));
        assert!(!looks_like_loading(r#"{"error": "rate limited"}"#));
        assert!(!looks_like_loading("[1, 2, 3]"));
    }
}
