use crate::error::Result;

/// Create the three tables if absent. Safe to run on every startup; the DDL
/// is idempotent.
pub async fn ensure_schema(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grid_telemetry (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL UNIQUE,
            overall_intensity INTEGER NOT NULL,
            fuel_gas_perc REAL NOT NULL,
            fuel_nuclear_perc REAL NOT NULL,
            fuel_wind_perc REAL NOT NULL,
            fuel_solar_perc REAL NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etl_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_timestamp TEXT NOT NULL,
            status TEXT NOT NULL,
            rows_inserted INTEGER NOT NULL DEFAULT 0,
            execution_time_ms INTEGER NOT NULL DEFAULT 0,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grid_predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fuel_type TEXT NOT NULL,
            predicted_value REAL NOT NULL,
            prediction_timestamp TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (fuel_type, prediction_timestamp)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_predictions_slot ON grid_predictions (prediction_timestamp)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
