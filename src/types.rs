use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// One listing as produced by the acquisition agent. Never mutated after
/// construction; scoring maps it into a [`ScoredListing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub title: String,
    /// Free text, any currency formatting.
    pub price: String,
    #[serde(default)]
    pub year: Option<i32>,
    /// Free text, any unit.
    #[serde(default)]
    pub mileage: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl RawListing {
    /// Build a listing from an untyped agent record.
    ///
    /// `title` and `price` must be present as strings; anything else is a
    /// contract violation reported with the record's position. Optional
    /// fields tolerate absence, `null`, and wrong types (treated as absent).
    pub fn from_value(index: usize, v: &serde_json::Value) -> Result<Self> {
        let obj = v.as_object().ok_or_else(|| {
            AppError::Validation(format!("listing #{index} is not a JSON object"))
        })?;

        let required = |field: &str| -> Result<String> {
            match obj.get(field) {
                Some(serde_json::Value::String(s)) => Ok(s.clone()),
                Some(other) => Err(AppError::Validation(format!(
                    "listing #{index}: field `{field}` must be a string, got {other}"
                ))),
                None => Err(AppError::Validation(format!(
                    "listing #{index}: missing required field `{field}`"
                ))),
            }
        };
        let optional = |field: &str| -> Option<String> {
            obj.get(field).and_then(|s| s.as_str()).map(|s| s.to_string())
        };

        let year = obj
            .get("year")
            .and_then(|y| y.as_i64())
            .and_then(|y| i32::try_from(y).ok());

        Ok(Self {
            title: required("title")?,
            price: required("price")?,
            year,
            mileage: optional("mileage"),
            location: optional("location"),
            url: optional("url"),
            image_url: optional("image_url"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceRating {
    /// composite score ≤ 0.75
    #[serde(rename = "Sweet Spot")]
    SweetSpot,
    /// composite score ≤ 1.5
    Balanced,
    Outlier,
    /// Sample too small to standardise.
    #[serde(rename = "Insufficient Data")]
    InsufficientData,
}

impl BalanceRating {
    pub fn from_score(score: f64) -> Self {
        use crate::config::rating_thresholds::*;
        if score <= SWEET_SPOT_MAX {
            BalanceRating::SweetSpot
        } else if score <= BALANCED_MAX {
            BalanceRating::Balanced
        } else {
            BalanceRating::Outlier
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "sweetspot" => Some(BalanceRating::SweetSpot),
            "balanced" => Some(BalanceRating::Balanced),
            "outlier" => Some(BalanceRating::Outlier),
            "insufficientdata" => Some(BalanceRating::InsufficientData),
            _ => None,
        }
    }
}

impl std::fmt::Display for BalanceRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BalanceRating::SweetSpot => "Sweet Spot",
            BalanceRating::Balanced => "Balanced",
            BalanceRating::Outlier => "Outlier",
            BalanceRating::InsufficientData => "Insufficient Data",
        };
        write!(f, "{s}")
    }
}

/// A listing plus everything derived from it against one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredListing {
    #[serde(flatten)]
    pub listing: RawListing,
    /// `None` = unparseable; sorts last.
    pub price_numeric: Option<f64>,
    /// Kilometres. `None` = unknown; sorts last.
    pub mileage_numeric: Option<f64>,
    pub price_z: f64,
    pub year_z: f64,
    pub mileage_z: f64,
    /// Distance from the sample's best corner. Always ≥ 0.
    pub composite_score: f64,
    pub balance_rating: BalanceRating,
}

// ---------------------------------------------------------------------------
// Acquisition output
// ---------------------------------------------------------------------------

/// What the agent reports for a single marketplace search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_url: String,
    /// Agent-reported count; may exceed `listings.len()`.
    pub total_listings: usize,
    pub price_range: String,
    pub common_models: Vec<String>,
    pub locations: Vec<String>,
    pub listings: Vec<RawListing>,
    pub summary: String,
    pub analyzed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Consolidation output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestStatus {
    Ok,
    NoListings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub source_urls: Vec<String>,
    pub total_listings_found: usize,
    pub global_price_range: String,
    pub all_models: Vec<String>,
    pub all_locations: Vec<String>,
    /// Prefix of `all_sorted`, at most `TOP_N` long.
    pub top: Vec<ScoredListing>,
    pub all_sorted: Vec<ScoredListing>,
    pub summary: String,
    pub status: DigestStatus,
    pub analyzed_at: DateTime<Utc>,
}
