//! Free-text price and mileage parsing.
//!
//! Two layers: `price_value` / `mileage_value` return `None` for anything
//! unusable and are what the scorer and ranker consume; `parse_price` /
//! `parse_mileage` collapse that to the numeric sentinels (`0.0` and
//! `999999.0`) for callers that want a plain float.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{MILEAGE_UNKNOWN, MILES_TO_KM};

lazy_static! {
    static ref AED_RE: Regex = Regex::new(r"(?i)aed").unwrap();
    static ref MILES_RE: Regex = Regex::new(r"(?i)\b(miles?|mi)\b").unwrap();
    static ref KM_RE: Regex = Regex::new(r"(?i)\b(km|kilometers?|kilometres?)\b").unwrap();
}

/// Arabic for Dirham.
const DIRHAM_AR: &str = "درهم";

const UNKNOWN_MILEAGE_MARKERS: &[&str] = &["unknown", "unavailable", "n/a", "na", "not available"];

/// Parse a price into currency units. `None` when nothing positive and finite
/// can be read from it.
pub fn price_value(text: &str) -> Option<f64> {
    let stripped = AED_RE.replace_all(text.trim(), "");
    let clean = stripped
        .replace(DIRHAM_AR, "")
        .replace('$', "")
        .replace(',', "")
        .trim()
        .to_uppercase();

    let value = if let Some(n) = clean.strip_suffix('K') {
        parse_number(n)? * 1_000.0
    } else if let Some(n) = clean.strip_suffix('M') {
        parse_number(n)? * 1_000_000.0
    } else {
        parse_number(&clean)?
    };

    (value > 0.0 && value.is_finite()).then_some(value)
}

/// Parse a mileage into kilometres. Miles are converted at 1.6.
/// `None` for unknown markers, garbage, and anything at or above the
/// unknown-mileage sentinel.
pub fn mileage_value(text: &str) -> Option<f64> {
    let raw = raw_mileage(text)?;
    (raw < MILEAGE_UNKNOWN).then_some(raw)
}

/// Sentinel form of [`price_value`]: `0.0` means unparseable.
pub fn parse_price(text: &str) -> f64 {
    price_value(text).unwrap_or(0.0)
}

/// Sentinel form of [`mileage_value`]: `999999.0` means unknown.
///
/// Converted values that land at or above the sentinel are returned as-is;
/// consumers treat anything `>= 999999` as unknown.
pub fn parse_mileage(text: &str) -> f64 {
    raw_mileage(text).unwrap_or(MILEAGE_UNKNOWN)
}

fn raw_mileage(text: &str) -> Option<f64> {
    let clean = text.trim().replace(',', "").to_uppercase();
    if clean.is_empty() {
        return None;
    }

    let lower = clean.to_lowercase();
    if UNKNOWN_MILEAGE_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }

    let is_miles = MILES_RE.is_match(&clean);
    let clean = if is_miles {
        MILES_RE.replace_all(&clean, "").into_owned()
    } else {
        clean
    };
    let clean = KM_RE.replace_all(&clean, "");
    let clean = clean.trim();

    let value = match clean.strip_suffix('K') {
        Some(n) => parse_number(n)? * 1_000.0,
        None => parse_number(clean)?,
    };

    let km = if is_miles { value * MILES_TO_KM } else { value };
    km.is_finite().then_some(km)
}

/// Strict float parse: finite values only, surrounding whitespace allowed.
/// Suffix multipliers can still overflow, so callers re-check the product.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
