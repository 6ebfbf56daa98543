/// Row types for the digest history tables (see migrations/).
/// Serialized as-is by the HTTP API.
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DigestRunRow {
    pub id: i64,
    /// Nanosecond UTC epoch.
    pub analyzed_at: i64,
    pub status: String,
    pub sources: i64,
    pub total_listings: i64,
    pub ranked_listings: i64,
    pub price_range: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScoredListingRow {
    pub run_id: i64,
    pub rank: i64,
    pub title: String,
    pub price: String,
    pub year: Option<i64>,
    pub mileage: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub price_numeric: Option<f64>,
    pub mileage_numeric: Option<f64>,
    pub price_z: f64,
    pub year_z: f64,
    pub mileage_z: f64,
    pub composite_score: f64,
    pub balance_rating: String,
}
