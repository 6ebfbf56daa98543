//! Frontend payload for the listings dashboard.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::ranker::consolidate::SORTING_CRITERIA;
use crate::types::{BalanceRating, ConsolidatedResult, ScoredListing};

const UNATTRIBUTED: &str = "unattributed";
const OTHER_MODEL: &str = "Other";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub metadata: Metadata,
    pub listings: Vec<ReportListing>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub generated_at: String,
    pub total_listings: usize,
    pub sources_analyzed: usize,
    pub global_price_range: String,
    pub available_models: Vec<String>,
    pub available_locations: Vec<String>,
    pub source_urls: Vec<String>,
    pub sorting_criteria: &'static str,
    pub price_stats: RangeStats,
    pub mileage_stats: RangeStats,
    pub model_distribution: Vec<ModelCount>,
    pub source_breakdown: Vec<SourceBreakdown>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RangeStats {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub average: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ModelCount {
    pub model: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakdown {
    pub source: String,
    pub listing_count: usize,
    pub average_price: Option<i64>,
    pub median_price: Option<i64>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub average_mileage: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListing {
    pub id: usize,
    pub title: String,
    pub price: String,
    pub year: Option<i32>,
    pub mileage: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub image_url: String,
    pub balance_score: f64,
    pub balance_rating: BalanceRating,
    pub price_z_score: f64,
    pub year_z_score: f64,
    pub mileage_z_score: f64,
    pub price_numeric: Option<f64>,
    pub mileage_numeric: Option<f64>,
    pub source: String,
    pub model_label: String,
    pub has_image: bool,
}

#[derive(Default)]
struct SourceAccumulator {
    count: usize,
    prices: Vec<f64>,
    mileages: Vec<f64>,
}

pub fn build_report(result: &ConsolidatedResult) -> Report {
    // longest first so "Model 3 Performance" wins over "Model 3"
    let mut search_models: Vec<&String> = result.all_models.iter().collect();
    search_models.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut model_counts: HashMap<&str, usize> = HashMap::new();
    let mut source_order: Vec<String> = Vec::new();
    let mut sources: HashMap<String, SourceAccumulator> = HashMap::new();

    let listings: Vec<ReportListing> = result
        .all_sorted
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let id = i + 1;
            let source = source_domain(l.listing.url.as_deref());
            let title_lower = l.listing.title.to_lowercase();
            let model_label = search_models
                .iter()
                .find(|m| title_lower.contains(&m.to_lowercase()))
                .map_or(OTHER_MODEL, |m| m.as_str());
            *model_counts.entry(model_label).or_default() += 1;

            let acc = sources.entry(source.clone()).or_insert_with(|| {
                source_order.push(source.clone());
                SourceAccumulator::default()
            });
            acc.count += 1;
            acc.prices.extend(l.price_numeric);
            acc.mileages.extend(l.mileage_numeric);

            report_listing(id, l, source, model_label.to_string())
        })
        .collect();

    let prices: Vec<f64> = result.all_sorted.iter().filter_map(|l| l.price_numeric).collect();
    let mileages: Vec<f64> = result.all_sorted.iter().filter_map(|l| l.mileage_numeric).collect();

    let mut model_distribution: Vec<ModelCount> = result
        .all_models
        .iter()
        .filter_map(|m| {
            model_counts
                .get(m.as_str())
                .filter(|&&c| c > 0)
                .map(|&count| ModelCount { model: m.clone(), count })
        })
        .collect();
    model_distribution.push(ModelCount {
        model: OTHER_MODEL.to_string(),
        count: model_counts.get(OTHER_MODEL).copied().unwrap_or(0),
    });

    let mut source_breakdown: Vec<SourceBreakdown> = source_order
        .into_iter()
        .filter_map(|name| {
            let acc = sources.remove(&name)?;
            Some(SourceBreakdown {
                source: name,
                listing_count: acc.count,
                average_price: mean(&acc.prices).map(round),
                median_price: median(&acc.prices).map(round),
                min_price: acc.prices.iter().copied().reduce(f64::min).map(round),
                max_price: acc.prices.iter().copied().reduce(f64::max).map(round),
                average_mileage: mean(&acc.mileages).map(round),
            })
        })
        .collect();
    source_breakdown.sort_by(|a, b| b.listing_count.cmp(&a.listing_count));

    Report {
        metadata: Metadata {
            generated_at: result.analyzed_at.to_rfc3339(),
            total_listings: result.total_listings_found,
            sources_analyzed: result.source_urls.len(),
            global_price_range: result.global_price_range.clone(),
            available_models: result.all_models.clone(),
            available_locations: result.all_locations.clone(),
            source_urls: result.source_urls.clone(),
            sorting_criteria: SORTING_CRITERIA,
            price_stats: range_stats(&prices),
            mileage_stats: range_stats(&mileages),
            model_distribution,
            source_breakdown,
        },
        listings,
    }
}

/// Write the report as pretty JSON, creating parent directories.
pub async fn write_report(path: &Path, report: &Report) -> Result<()> {
    let body = serde_json::to_string_pretty(report)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &body).await?;
    info!(
        path = %path.display(),
        bytes = body.len(),
        listings = report.listings.len(),
        "report written to {}",
        path.display(),
    );
    Ok(())
}

fn report_listing(id: usize, l: &ScoredListing, source: String, model_label: String) -> ReportListing {
    let image_url = l
        .listing
        .image_url
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("https://placehold.co/400x300/1f2937/ffffff?text=Tesla+Image+{id}"));

    ReportListing {
        id,
        title: l.listing.title.clone(),
        price: l.listing.price.clone(),
        year: l.listing.year,
        mileage: l.listing.mileage.clone(),
        location: l.listing.location.clone(),
        url: l.listing.url.clone(),
        image_url,
        balance_score: round2(l.composite_score),
        balance_rating: l.balance_rating,
        price_z_score: round2(l.price_z),
        year_z_score: round2(l.year_z),
        mileage_z_score: round2(l.mileage_z),
        price_numeric: l.price_numeric,
        mileage_numeric: l.mileage_numeric,
        source,
        model_label,
        has_image: l.listing.image_url.as_deref().is_some_and(|u| !u.is_empty()),
    }
}

/// Listing host without a leading `www.`; `unattributed` when there is none.
pub fn source_domain(url: Option<&str>) -> String {
    url.and_then(|u| reqwest::Url::parse(u).ok())
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNATTRIBUTED.to_string())
}

fn range_stats(values: &[f64]) -> RangeStats {
    RangeStats {
        min: values.iter().copied().reduce(f64::min).map(round),
        max: values.iter().copied().reduce(f64::max).map(round),
        average: mean(values).map(round),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

fn round(v: f64) -> i64 {
    v.round() as i64
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
