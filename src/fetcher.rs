use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::{Config, FETCH_BACKOFF_SECS, FETCH_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::RawSample;

/// What one upstream poll produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Both endpoints answered with a reading for the current slot.
    Fetched(RawSample),
    /// Upstream answered but has nothing for the slot yet (404 or an empty
    /// data array). Benign; the next scheduled run picks it up.
    NoDataYet,
}

/// How a single attempt failed, deciding whether the retry loop continues.
#[derive(Debug)]
pub enum AttemptError {
    /// Timeout, connect failure or 5xx. Worth retrying.
    Transient(String),
    /// Any other HTTP status or a malformed body. Retrying cannot help.
    Fatal(String),
}

/// Drive `op` through the backoff schedule: one attempt per entry in
/// FETCH_BACKOFF_SECS, sleeping that entry's delay after each failed
/// attempt. Fatal errors short-circuit; exhausting the schedule yields
/// TransientFetch.
pub async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut last_err = String::new();
    for (attempt, &delay_secs) in FETCH_BACKOFF_SECS.iter().enumerate() {
        match op().await {
            Ok(v) => return Ok(v),
            Err(AttemptError::Fatal(msg)) => {
                return Err(AppError::Fetch(format!("{what}: {msg}")));
            }
            Err(AttemptError::Transient(msg)) => {
                warn!(
                    endpoint = what,
                    attempt = attempt + 1,
                    max_attempts = FETCH_BACKOFF_SECS.len(),
                    delay_secs,
                    "transient fetch failure: {msg}"
                );
                last_err = msg;
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            }
        }
    }
    error!(
        endpoint = what,
        attempts = FETCH_BACKOFF_SECS.len(),
        "fetch retries exhausted: {last_err}"
    );
    Err(AppError::TransientFetch(format!(
        "{what}: {last_err} ({} attempts)",
        FETCH_BACKOFF_SECS.len()
    )))
}

/// Poll both upstream endpoints (current intensity, generation mix) and
/// assemble the raw reading. Each endpoint gets its own retry schedule; the
/// first NoDataYet wins since a sample needs both halves.
pub async fn fetch_current(cfg: &Config) -> Result<FetchOutcome> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()?;
    let base = cfg.grid_api_url.trim_end_matches('/').to_string();

    let slot = match with_retry("intensity", || fetch_intensity_once(&client, &base)).await? {
        Some(s) => s,
        None => {
            debug!("no intensity reading published yet");
            return Ok(FetchOutcome::NoDataYet);
        }
    };
    let mix = match with_retry("generation", || fetch_generation_once(&client, &base)).await? {
        Some(m) => m,
        None => {
            debug!("no generation mix published yet");
            return Ok(FetchOutcome::NoDataYet);
        }
    };

    Ok(FetchOutcome::Fetched(RawSample {
        timestamp: slot.from,
        overall_intensity: slot.value,
        fuel_gas_perc: mix.perc("gas"),
        fuel_nuclear_perc: mix.perc("nuclear"),
        fuel_wind_perc: mix.perc("wind"),
        fuel_solar_perc: mix.perc("solar"),
    }))
}

/// Current slot as reported by /intensity, fields still unvalidated.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensitySlot {
    pub from: Option<String>,
    pub value: Option<f64>,
}

/// Per-fuel generation percentages keyed by upstream fuel name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationMix {
    entries: Vec<(String, f64)>,
}

impl GenerationMix {
    pub fn perc(&self, fuel: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(fuel))
            .map(|(_, p)| *p)
    }
}

async fn fetch_intensity_once(
    client: &reqwest::Client,
    base: &str,
) -> std::result::Result<Option<IntensitySlot>, AttemptError> {
    let url = format!("{base}/intensity");
    match get_json(client, &url).await? {
        Some(body) => parse_intensity_payload(&body),
        None => Ok(None),
    }
}

async fn fetch_generation_once(
    client: &reqwest::Client,
    base: &str,
) -> std::result::Result<Option<GenerationMix>, AttemptError> {
    let url = format!("{base}/generation");
    match get_json(client, &url).await? {
        Some(body) => parse_generation_payload(&body),
        None => Ok(None),
    }
}

/// GET a JSON body. `Ok(None)` is a 404 (upstream publishes nothing for the
/// slot yet); 5xx and transport failures are transient, other non-success
/// statuses and undecodable bodies are fatal.
async fn get_json(
    client: &reqwest::Client,
    url: &str,
) -> std::result::Result<Option<serde_json::Value>, AttemptError> {
    let resp = client.get(url).send().await.map_err(classify_reqwest)?;
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status.is_server_error() {
        return Err(AttemptError::Transient(format!("{url}: HTTP {status}")));
    }
    if !status.is_success() {
        return Err(AttemptError::Fatal(format!("{url}: HTTP {status}")));
    }
    let body = resp
        .json::<serde_json::Value>()
        .await
        .map_err(classify_reqwest)?;
    Ok(Some(body))
}

fn classify_reqwest(e: reqwest::Error) -> AttemptError {
    if e.is_decode() {
        AttemptError::Fatal(e.to_string())
    } else {
        AttemptError::Transient(e.to_string())
    }
}

/// Extract the current slot from an /intensity payload. Ok(None) when the
/// data array is present but empty (nothing published for the slot yet); a
/// body without a data array at all is malformed and fatal. The measured
/// value is preferred; the upstream's own forecast stands in when the
/// actual is null.
pub fn parse_intensity_payload(
    v: &serde_json::Value,
) -> std::result::Result<Option<IntensitySlot>, AttemptError> {
    let data = v
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| AttemptError::Fatal("intensity body has no data array".to_string()))?;
    let Some(slot) = data.first() else {
        return Ok(None);
    };
    let from = slot
        .get("from")
        .and_then(|s| s.as_str())
        .map(|s| s.to_string());
    let intensity = slot.get("intensity");
    let value = intensity
        .and_then(|i| i.get("actual"))
        .and_then(|a| a.as_f64())
        .or_else(|| {
            intensity
                .and_then(|i| i.get("forecast"))
                .and_then(|f| f.as_f64())
        });
    Ok(Some(IntensitySlot { from, value }))
}

/// Extract the fuel mix from a /generation payload. Ok(None) when the
/// generationmix array is present but empty; a body without one is
/// malformed and fatal, as is a mix none of whose entries parse.
pub fn parse_generation_payload(
    v: &serde_json::Value,
) -> std::result::Result<Option<GenerationMix>, AttemptError> {
    let mix = v
        .get("data")
        .and_then(|d| d.get("generationmix"))
        .and_then(|m| m.as_array())
        .ok_or_else(|| {
            AttemptError::Fatal("generation body has no generationmix array".to_string())
        })?;
    if mix.is_empty() {
        return Ok(None);
    }
    let entries: Vec<(String, f64)> = mix
        .iter()
        .filter_map(|e| {
            let fuel = e.get("fuel")?.as_str()?.to_string();
            let perc = e.get("perc")?.as_f64()?;
            Some((fuel, perc))
        })
        .collect();
    if entries.is_empty() {
        return Err(AttemptError::Fatal(
            "generation body has no parseable fuel entries".to_string(),
        ));
    }
    Ok(Some(GenerationMix { entries }))
}
