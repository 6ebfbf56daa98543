use tracing::info;

use crate::error::Result;
use crate::types::{ConsolidatedResult, DigestStatus};

/// Persists consolidated digests. One run row plus one row per ranked
/// listing, written in a single transaction.
#[derive(Clone)]
pub struct DigestWriter {
    pool: sqlx::SqlitePool,
}

impl DigestWriter {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the new run id.
    pub async fn write_run(&self, result: &ConsolidatedResult) -> Result<i64> {
        let analyzed_at = result.analyzed_at.timestamp_nanos_opt().unwrap_or_default();
        let status = match result.status {
            DigestStatus::Ok => "ok",
            DigestStatus::NoListings => "no_listings",
        };

        let mut tx = self.pool.begin().await?;

        let run_id = sqlx::query(
            r#"
            INSERT INTO digest_runs (
                analyzed_at, status, sources, total_listings, ranked_listings, price_range, summary
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(analyzed_at)
        .bind(status)
        .bind(result.source_urls.len() as i64)
        .bind(result.total_listings_found as i64)
        .bind(result.all_sorted.len() as i64)
        .bind(result.global_price_range.as_str())
        .bind(result.summary.as_str())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (i, l) in result.all_sorted.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO scored_listings (
                    run_id, rank, title, price, year, mileage, location, url, image_url,
                    price_numeric, mileage_numeric, price_z, year_z, mileage_z,
                    composite_score, balance_rating
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(i as i64 + 1)
            .bind(l.listing.title.as_str())
            .bind(l.listing.price.as_str())
            .bind(l.listing.year.map(i64::from))
            .bind(l.listing.mileage.as_deref())
            .bind(l.listing.location.as_deref())
            .bind(l.listing.url.as_deref())
            .bind(l.listing.image_url.as_deref())
            .bind(l.price_numeric)
            .bind(l.mileage_numeric)
            .bind(l.price_z)
            .bind(l.year_z)
            .bind(l.mileage_z)
            .bind(l.composite_score)
            .bind(l.balance_rating.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            run_id,
            listings = result.all_sorted.len(),
            status,
            "digest run {run_id} persisted",
        );
        Ok(run_id)
    }
}
