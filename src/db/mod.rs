pub mod models;
pub mod queries;
pub mod writer;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::error::Result;

pub use writer::DigestWriter;

/// Open (creating if needed) the history database and apply migrations.
pub async fn connect(db_path: &str) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {db_path}");
    Ok(pool)
}

/// Single-connection in-memory database with migrations applied.
#[cfg(test)]
pub async fn memory_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}
