use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::db::models::{DigestRunRow, ScoredListingRow};
use crate::db::queries;
use crate::error::AppError;
use crate::types::BalanceRating;

const DEFAULT_RUNS_LIMIT: i64 = 20;
const DEFAULT_LISTINGS_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/runs", get(get_runs))
        .route("/runs/latest", get(get_latest_run))
        .route("/runs/:id/listings", get(get_run_listings))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct ListingsQuery {
    pub rating: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub runs: i64,
    /// Nanosecond UTC epoch of the newest persisted run.
    pub last_run_at: Option<i64>,
    pub digest_running: bool,
    /// Nanosecond UTC epoch of the last digest this process completed.
    pub last_digest_at: Option<u64>,
    pub last_failed_sources: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let runs = queries::run_count(&state.pool).await?;
    let last_run_at = queries::latest_run(&state.pool).await?.map(|r| r.analyzed_at);

    Ok(Json(HealthResponse {
        status: "ok",
        runs,
        last_run_at,
        digest_running: state.health.digest_running(),
        last_digest_at: Some(state.health.last_digest_at_ns()).filter(|&ns| ns > 0),
        last_failed_sources: state.health.last_failed_sources(),
    }))
}

async fn get_runs(
    State(state): State<ApiState>,
    Query(params): Query<RunsQuery>,
) -> Result<Json<Vec<DigestRunRow>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_RUNS_LIMIT).max(0);
    Ok(Json(queries::recent_runs(&state.pool, limit).await?))
}

async fn get_latest_run(
    State(state): State<ApiState>,
) -> Result<Json<Option<DigestRunRow>>, AppError> {
    Ok(Json(queries::latest_run(&state.pool).await?))
}

async fn get_run_listings(
    State(state): State<ApiState>,
    Path(run_id): Path<i64>,
    Query(params): Query<ListingsQuery>,
) -> Result<Json<Vec<ScoredListingRow>>, AppError> {
    let rating = match params.rating.as_deref().filter(|r| !r.trim().is_empty()) {
        None => None,
        Some(raw) => Some(
            BalanceRating::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown rating '{raw}'")))?,
        ),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LISTINGS_LIMIT).max(0);

    Ok(Json(queries::run_listings(&state.pool, run_id, rating, limit).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, DigestWriter};
    use crate::ranker::consolidate;
    use crate::types::{RawListing, SourceSummary};
    use chrono::Utc;

    fn summary() -> SourceSummary {
        let listing = |title: &str, price: &str, year: i32, mileage: &str| RawListing {
            title: title.to_string(),
            price: price.to_string(),
            year: Some(year),
            mileage: Some(mileage.to_string()),
            location: Some("Dubai".to_string()),
            url: None,
            image_url: None,
        };
        SourceSummary {
            source_url: "https://a.example".to_string(),
            total_listings: 4,
            price_range: String::new(),
            common_models: vec![],
            locations: vec![],
            listings: vec![
                listing("Model 3 LR", "AED 120,000", 2022, "30,000 km"),
                listing("Model Y", "AED 140,000", 2023, "10,000 km"),
                listing("Model S", "AED 320,000", 2018, "150,000 km"),
                listing("Model 3 SR", "AED 95,000", 2021, "60,000 km"),
            ],
            summary: String::new(),
            analyzed_at: Utc::now(),
        }
    }

    async fn state() -> ApiState {
        ApiState {
            pool: memory_pool().await,
            health: Arc::new(HealthState::new()),
        }
    }

    #[tokio::test]
    async fn health_on_empty_history() {
        let st = state().await;
        let Json(h) = get_health(State(st)).await.unwrap();
        assert_eq!(h.status, "ok");
        assert_eq!(h.runs, 0);
        assert_eq!(h.last_run_at, None);
        assert_eq!(h.last_digest_at, None);
        assert!(!h.digest_running);
    }

    #[tokio::test]
    async fn health_reports_in_process_digest() {
        let st = state().await;
        st.health.record_digest(1_700_000_000_000_000_000, 2);
        let Json(h) = get_health(State(st)).await.unwrap();
        assert_eq!(h.last_digest_at, Some(1_700_000_000_000_000_000));
        assert_eq!(h.last_failed_sources, 2);
    }

    #[tokio::test]
    async fn latest_run_is_null_until_first_digest() {
        let st = state().await;
        let Json(latest) = get_latest_run(State(st.clone())).await.unwrap();
        assert!(latest.is_none());

        let result = consolidate(&[summary()], Utc::now());
        let run_id = DigestWriter::new(st.pool.clone()).write_run(&result).await.unwrap();

        let Json(latest) = get_latest_run(State(st.clone())).await.unwrap();
        assert_eq!(latest.unwrap().id, run_id);

        let Json(h) = get_health(State(st)).await.unwrap();
        assert_eq!(h.runs, 1);
        assert!(h.last_run_at.is_some());
    }

    #[tokio::test]
    async fn runs_newest_first_with_limit() {
        let st = state().await;
        let writer = DigestWriter::new(st.pool.clone());
        for _ in 0..3 {
            writer.write_run(&consolidate(&[summary()], Utc::now())).await.unwrap();
        }

        let Json(runs) = get_runs(State(st), Query(RunsQuery { limit: Some(2) })).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].id > runs[1].id);
    }

    #[tokio::test]
    async fn listings_filtered_by_rating() {
        let st = state().await;
        let result = consolidate(&[summary()], Utc::now());
        let run_id = DigestWriter::new(st.pool.clone()).write_run(&result).await.unwrap();

        let Json(all) = get_run_listings(
            State(st.clone()),
            Path(run_id),
            Query(ListingsQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].title, "Model Y");

        let sweet = result
            .all_sorted
            .iter()
            .filter(|l| l.balance_rating == BalanceRating::SweetSpot)
            .count();
        let Json(rows) = get_run_listings(
            State(st),
            Path(run_id),
            Query(ListingsQuery { rating: Some("sweet-spot".to_string()), limit: None }),
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), sweet);
    }

    #[tokio::test]
    async fn unknown_rating_is_rejected() {
        let st = state().await;
        let err = get_run_listings(
            State(st),
            Path(1),
            Query(ListingsQuery { rating: Some("bargain".to_string()), limit: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
