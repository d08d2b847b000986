use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use thiserror::Error;

use crate::config::FRESHNESS_MAX_AGE_SECS;
use crate::types::{FuelMetric, RawSample, TelemetrySample};

/// Why a fetched reading was rejected. Variants name the offending field and
/// value so etl_runs.error_message is diagnosable on its own.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} is missing")]
    Missing { field: &'static str },

    #[error("{field} must be integral, got {value}")]
    NotInteger { field: &'static str, value: f64 },

    #[error("{field} out of range [{min}, {max}]: {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unparseable timestamp: {raw:?}")]
    UnparseableTimestamp { raw: String },

    #[error("stale reading: {timestamp} is {age_secs}s old, max {max_secs}s")]
    Stale {
        timestamp: DateTime<Utc>,
        age_secs: i64,
        max_secs: i64,
    },
}

/// Accepts RFC 3339 plus the upstream's second- and minute-precision naive
/// forms (`2025-12-09T14:00:00Z`, `2025-12-09T14:00Z`). Naive forms are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let trimmed = raw.trim().trim_end_matches('Z');
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Truncate to the top of the hour. Every slot comparison and join in the
/// system goes through this.
pub fn normalize_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Check every field of a fetched reading and produce the hour-normalized
/// sample. First failure wins; staleness is judged against fetch time, and
/// future-dated readings pass.
pub fn validate(
    raw: &RawSample,
    fetched_at: DateTime<Utc>,
) -> std::result::Result<TelemetrySample, ValidationError> {
    let ts_raw = raw
        .timestamp
        .as_deref()
        .ok_or(ValidationError::Missing { field: "timestamp" })?;
    let parsed = parse_timestamp(ts_raw).ok_or_else(|| ValidationError::UnparseableTimestamp {
        raw: ts_raw.to_string(),
    })?;

    let age_secs = (fetched_at - parsed).num_seconds();
    if age_secs > FRESHNESS_MAX_AGE_SECS {
        return Err(ValidationError::Stale {
            timestamp: parsed,
            age_secs,
            max_secs: FRESHNESS_MAX_AGE_SECS,
        });
    }

    let intensity = raw.overall_intensity.ok_or(ValidationError::Missing {
        field: "overall_intensity",
    })?;
    if !intensity.is_finite() || intensity.fract() != 0.0 {
        return Err(ValidationError::NotInteger {
            field: "overall_intensity",
            value: intensity,
        });
    }
    let (min, max) = FuelMetric::OverallIntensity.domain();
    if intensity < min || intensity > max {
        return Err(ValidationError::OutOfRange {
            field: "overall_intensity",
            value: intensity,
            min,
            max,
        });
    }

    Ok(TelemetrySample {
        timestamp: normalize_hour(parsed),
        overall_intensity: intensity as i64,
        fuel_gas_perc: check_perc("fuel_gas_perc", raw.fuel_gas_perc)?,
        fuel_nuclear_perc: check_perc("fuel_nuclear_perc", raw.fuel_nuclear_perc)?,
        fuel_wind_perc: check_perc("fuel_wind_perc", raw.fuel_wind_perc)?,
        fuel_solar_perc: check_perc("fuel_solar_perc", raw.fuel_solar_perc)?,
    })
}

fn check_perc(
    field: &'static str,
    value: Option<f64>,
) -> std::result::Result<f64, ValidationError> {
    let v = value.ok_or(ValidationError::Missing { field })?;
    if !v.is_finite() || !(0.0..=100.0).contains(&v) {
        return Err(ValidationError::OutOfRange {
            field,
            value: v,
            min: 0.0,
            max: 100.0,
        });
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 9, 14, 30, 0).unwrap()
    }

    fn raw_ok() -> RawSample {
        RawSample {
            timestamp: Some("2025-12-09T14:00Z".to_string()),
            overall_intensity: Some(156.0),
            fuel_gas_perc: Some(32.1),
            fuel_nuclear_perc: Some(18.4),
            fuel_wind_perc: Some(29.3),
            fuel_solar_perc: Some(2.2),
        }
    }

    #[test]
    fn minute_precision_timestamp_accepted() {
        let sample = validate(&raw_ok(), fetched_at()).unwrap();
        assert_eq!(
            sample.timestamp,
            Utc.with_ymd_and_hms(2025, 12, 9, 14, 0, 0).unwrap()
        );
        assert_eq!(sample.overall_intensity, 156);
    }

    #[test]
    fn rfc3339_timestamp_accepted() {
        let mut raw = raw_ok();
        raw.timestamp = Some("2025-12-09T14:00:00Z".to_string());
        assert!(validate(&raw, fetched_at()).is_ok());
    }

    #[test]
    fn offset_timestamp_normalized_to_utc() {
        let mut raw = raw_ok();
        raw.timestamp = Some("2025-12-09T15:00:00+01:00".to_string());
        let sample = validate(&raw, fetched_at()).unwrap();
        assert_eq!(
            sample.timestamp,
            Utc.with_ymd_and_hms(2025, 12, 9, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn half_hour_slot_truncated_to_hour() {
        let mut raw = raw_ok();
        raw.timestamp = Some("2025-12-09T14:30Z".to_string());
        let sample = validate(&raw, fetched_at()).unwrap();
        assert_eq!(
            sample.timestamp,
            Utc.with_ymd_and_hms(2025, 12, 9, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_timestamp_names_field() {
        let mut raw = raw_ok();
        raw.timestamp = None;
        assert_eq!(
            validate(&raw, fetched_at()),
            Err(ValidationError::Missing { field: "timestamp" })
        );
    }

    #[test]
    fn garbage_timestamp_is_unparseable() {
        let mut raw = raw_ok();
        raw.timestamp = Some("ninth of december".to_string());
        assert!(matches!(
            validate(&raw, fetched_at()),
            Err(ValidationError::UnparseableTimestamp { .. })
        ));
    }

    #[test]
    fn stale_reading_is_stale_not_unparseable() {
        let mut raw = raw_ok();
        raw.timestamp = Some("2025-12-09T11:00Z".to_string());
        assert!(matches!(
            validate(&raw, fetched_at()),
            Err(ValidationError::Stale { .. })
        ));
    }

    #[test]
    fn exactly_two_hours_old_still_fresh() {
        let mut raw = raw_ok();
        raw.timestamp = Some("2025-12-09T12:30Z".to_string());
        assert!(validate(&raw, fetched_at()).is_ok());
    }

    #[test]
    fn future_timestamp_allowed() {
        let mut raw = raw_ok();
        raw.timestamp = Some("2025-12-09T16:00Z".to_string());
        assert!(validate(&raw, fetched_at()).is_ok());
    }

    #[test]
    fn fractional_intensity_rejected() {
        let mut raw = raw_ok();
        raw.overall_intensity = Some(156.7);
        assert_eq!(
            validate(&raw, fetched_at()),
            Err(ValidationError::NotInteger {
                field: "overall_intensity",
                value: 156.7
            })
        );
    }

    #[test]
    fn intensity_above_cap_rejected() {
        let mut raw = raw_ok();
        raw.overall_intensity = Some(1001.0);
        assert!(matches!(
            validate(&raw, fetched_at()),
            Err(ValidationError::OutOfRange { field: "overall_intensity", .. })
        ));
    }

    #[test]
    fn negative_intensity_rejected() {
        let mut raw = raw_ok();
        raw.overall_intensity = Some(-1.0);
        assert!(matches!(
            validate(&raw, fetched_at()),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn missing_percentage_names_field() {
        let mut raw = raw_ok();
        raw.fuel_gas_perc = None;
        assert_eq!(
            validate(&raw, fetched_at()),
            Err(ValidationError::Missing { field: "fuel_gas_perc" })
        );
    }

    #[test]
    fn percentage_over_hundred_rejected() {
        let mut raw = raw_ok();
        raw.fuel_wind_perc = Some(100.5);
        assert!(matches!(
            validate(&raw, fetched_at()),
            Err(ValidationError::OutOfRange { field: "fuel_wind_perc", .. })
        ));
    }

    #[test]
    fn parse_timestamp_rejects_empty() {
        assert!(parse_timestamp("").is_none());
    }
}
