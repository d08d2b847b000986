pub mod history;
pub mod models;
pub mod schema;
pub mod writer;

pub use schema::ensure_schema;

use crate::error::Result;

/// Open the SQLite pool, creating the database file if needed, and install
/// the schema.
pub async fn connect(db_path: &str) -> Result<sqlx::SqlitePool> {
    let url = if db_path.starts_with("sqlite:") {
        db_path.to_string()
    } else {
        format!("sqlite:{db_path}?mode=rwc")
    };
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}
