use crate::db::models::{DigestRunRow, ScoredListingRow};
use crate::error::Result;
use crate::types::BalanceRating;

const RUN_COLUMNS: &str =
    "id, analyzed_at, status, sources, total_listings, ranked_listings, price_range, summary";

pub async fn run_count(pool: &sqlx::SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM digest_runs")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn latest_run(pool: &sqlx::SqlitePool) -> Result<Option<DigestRunRow>> {
    let row = sqlx::query_as::<_, DigestRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM digest_runs ORDER BY id DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn recent_runs(pool: &sqlx::SqlitePool, limit: i64) -> Result<Vec<DigestRunRow>> {
    let rows = sqlx::query_as::<_, DigestRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM digest_runs ORDER BY id DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Ranked listings of one run, best rank first.
pub async fn run_listings(
    pool: &sqlx::SqlitePool,
    run_id: i64,
    rating: Option<BalanceRating>,
    limit: i64,
) -> Result<Vec<ScoredListingRow>> {
    let rating = rating.map(|r| r.to_string());
    let rows = sqlx::query_as::<_, ScoredListingRow>(
        r#"
        SELECT run_id, rank, title, price, year, mileage, location, url, image_url,
               price_numeric, mileage_numeric, price_z, year_z, mileage_z,
               composite_score, balance_rating
        FROM scored_listings
        WHERE run_id = ? AND (? IS NULL OR balance_rating = ?)
        ORDER BY rank ASC
        LIMIT ?
        "#,
    )
    .bind(run_id)
    .bind(rating.as_deref())
    .bind(rating.as_deref())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
