//! Dev helper: seed a day of synthetic telemetry so the forecast and
//! accuracy paths can be exercised without live upstream data.

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::info;

use crate::db::writer::{PersistOutcome, PersistenceWriter};
use crate::error::Result;
use crate::types::TelemetrySample;
use crate::validator::normalize_hour;

/// 24 synthetic hourly samples starting at `start`. Intensity and mix
/// follow a coarse day/night pattern with a small per-index wobble: dirtier
/// and sunnier during the day, windier at night. Nuclear holds steady and
/// gas absorbs the remainder.
pub fn synthetic_day(start: DateTime<Utc>) -> Vec<TelemetrySample> {
    (0..24u32)
        .map(|i| {
            let slot = start + Duration::hours(i as i64);
            let hour = slot.hour();
            let (intensity, wind, solar) = if (6..=22).contains(&hour) {
                (
                    95 + (i % 20) as i64,
                    40.0 + (i % 15) as f64,
                    5.0 + (i % 8) as f64,
                )
            } else {
                (80 + (i % 10) as i64, 50.0 + (i % 20) as f64, 0.5)
            };
            TelemetrySample {
                timestamp: slot,
                overall_intensity: intensity,
                fuel_gas_perc: 100.0 - wind - solar - 10.0,
                fuel_nuclear_perc: 10.0,
                fuel_wind_perc: wind,
                fuel_solar_perc: solar,
            }
        })
        .collect()
}

/// Insert one synthetic day through the normal persist path, starting at
/// the current top of hour. Slots that already exist are skipped by dedup.
/// Returns the number of rows actually inserted.
pub async fn seed_day(writer: &PersistenceWriter) -> Result<usize> {
    let start = normalize_hour(Utc::now());
    let mut inserted = 0usize;
    for sample in synthetic_day(start) {
        match writer.persist(&sample).await? {
            PersistOutcome::Inserted(_) => inserted += 1,
            PersistOutcome::Duplicate => {}
        }
    }
    info!(inserted, start = %start, "seeded synthetic telemetry day");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use crate::types::FuelMetric;
    use chrono::TimeZone;

    #[test]
    fn day_is_hourly_and_in_domain() {
        let start = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        let day = synthetic_day(start);
        assert_eq!(day.len(), 24);

        for (i, s) in day.iter().enumerate() {
            assert_eq!(s.timestamp, start + Duration::hours(i as i64));
            let (lo, hi) = FuelMetric::OverallIntensity.domain();
            assert!((lo..=hi).contains(&(s.overall_intensity as f64)));
            for perc in [
                s.fuel_gas_perc,
                s.fuel_nuclear_perc,
                s.fuel_wind_perc,
                s.fuel_solar_perc,
            ] {
                assert!((0.0..=100.0).contains(&perc));
            }
        }
    }

    #[test]
    fn night_hours_have_near_zero_solar() {
        let start = Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap();
        let day = synthetic_day(start);
        assert_eq!(day[3].fuel_solar_perc, 0.5);
        assert!(day[12].fuel_solar_perc >= 5.0);
    }

    #[tokio::test]
    async fn reseeding_is_idempotent() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        let writer = PersistenceWriter::new(pool);

        assert_eq!(seed_day(&writer).await.unwrap(), 24);
        assert_eq!(seed_day(&writer).await.unwrap(), 0);

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM grid_telemetry")
            .fetch_one(writer.pool())
            .await
            .unwrap();
        assert_eq!(n, 24);
    }
}
