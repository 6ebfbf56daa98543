//! Per-field sample statistics over a batch of listings.

use crate::config::MIN_VALID_YEAR;
use crate::normalize::{mileage_value, price_value};
use crate::types::RawListing;

/// Mean and sample standard deviation of one field's valid values.
///
/// With fewer than two values the mean is 0 and the deviation is 1, so
/// z-scores stay finite without meaning anything.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStats {
    pub count: usize,
    pub mean: f64,
    pub stdev: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldStats {
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        let (mean, stdev) = if count >= 2 {
            mean_and_stdev(values)
        } else {
            (0.0, 1.0)
        };

        Self {
            count,
            mean,
            stdev,
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
        }
    }

    pub fn z(&self, value: f64) -> f64 {
        z_score(value, self.mean, self.stdev)
    }
}

/// Statistics for the three scored fields of one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    pub price: FieldStats,
    pub year: FieldStats,
    pub mileage: FieldStats,
}

impl SampleStats {
    pub fn from_listings(listings: &[RawListing]) -> Self {
        let prices: Vec<f64> = listings.iter().filter_map(|l| price_value(&l.price)).collect();
        let years: Vec<f64> = listings.iter().filter_map(valid_year).collect();
        let mileages: Vec<f64> = listings
            .iter()
            .filter_map(|l| l.mileage.as_deref().and_then(mileage_value))
            .collect();

        Self {
            price: FieldStats::from_values(&prices),
            year: FieldStats::from_values(&years),
            mileage: FieldStats::from_values(&mileages),
        }
    }
}

/// Year as a float, if it is present and newer than `MIN_VALID_YEAR`.
pub fn valid_year(listing: &RawListing) -> Option<f64> {
    listing
        .year
        .filter(|&y| y > MIN_VALID_YEAR)
        .map(f64::from)
}

/// 0 when the deviation is zero or not finite.
pub fn z_score(value: f64, mean: f64, stdev: f64) -> f64 {
    if stdev > 0.0 && stdev.is_finite() {
        (value - mean) / stdev
    } else {
        0.0
    }
}

/// Mean and Bessel-corrected deviation via Welford's running update.
/// Values are scaled by their largest magnitude first so sums near
/// `f64::MAX` cannot overflow. Caller guarantees at least two values.
fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    let scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return (0.0, 0.0);
    }

    let mut mean = 0.0_f64;
    let mut m2 = 0.0_f64;
    for (i, v) in values.iter().enumerate() {
        let x = v / scale;
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }

    let variance = (m2 / (values.len() - 1) as f64).max(0.0);
    (mean * scale, variance.sqrt() * scale)
}
