use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{CURRENCY, TOP_N};
use crate::scorer::score;
use crate::types::{ConsolidatedResult, DigestStatus, RawListing, ScoredListing, SourceSummary};

pub const NO_LISTINGS_RANGE: &str = "No listings found";
pub const NO_VALID_PRICES_RANGE: &str = "No valid prices found";
pub const NO_LISTINGS_SUMMARY: &str = "No Tesla listings found from any source.";
pub const SORTING_CRITERIA: &str = "Mileage ↑, Price ↑, Year ↓ (balance score tie-breaker)";

/// Full ranked sequence plus its headline prefix.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub all_sorted: Vec<ScoredListing>,
    pub top: Vec<ScoredListing>,
}

/// Flatten per-source batches (source order, then within-source order),
/// score them as one sample and sort.
pub fn rank_batches<B: AsRef<[RawListing]>>(batches: &[B]) -> Ranking {
    let flat: Vec<RawListing> = batches
        .iter()
        .flat_map(|b| b.as_ref().iter().cloned())
        .collect();

    let mut all_sorted = score(&flat);
    sort_listings(&mut all_sorted);
    let top = all_sorted.iter().take(TOP_N).cloned().collect();

    debug!(
        listings = all_sorted.len(),
        best_score = all_sorted.first().map(|l| l.composite_score),
        "ranked {} listings from {} batches",
        all_sorted.len(),
        batches.len(),
    );

    Ranking { all_sorted, top }
}

/// Stable sort: mileage ↑, price ↑, year ↓, composite score ↑.
/// Unknown mileage and price sort as +∞, missing year as 0.
pub fn sort_listings(listings: &mut [ScoredListing]) {
    listings.sort_by(compare_listings);
}

pub fn compare_listings(a: &ScoredListing, b: &ScoredListing) -> Ordering {
    let inf = f64::INFINITY;
    a.mileage_numeric
        .unwrap_or(inf)
        .total_cmp(&b.mileage_numeric.unwrap_or(inf))
        .then_with(|| {
            a.price_numeric
                .unwrap_or(inf)
                .total_cmp(&b.price_numeric.unwrap_or(inf))
        })
        .then_with(|| b.listing.year.unwrap_or(0).cmp(&a.listing.year.unwrap_or(0)))
        .then_with(|| a.composite_score.total_cmp(&b.composite_score))
}

/// Merge per-source summaries into one ranked, described result.
pub fn consolidate(summaries: &[SourceSummary], analyzed_at: DateTime<Utc>) -> ConsolidatedResult {
    if summaries.is_empty() {
        return ConsolidatedResult {
            source_urls: Vec::new(),
            total_listings_found: 0,
            global_price_range: NO_LISTINGS_RANGE.to_string(),
            all_models: Vec::new(),
            all_locations: Vec::new(),
            top: Vec::new(),
            all_sorted: Vec::new(),
            summary: NO_LISTINGS_SUMMARY.to_string(),
            status: DigestStatus::NoListings,
            analyzed_at,
        };
    }

    let batches: Vec<&[RawListing]> = summaries.iter().map(|s| s.listings.as_slice()).collect();
    let Ranking { all_sorted, top } = rank_batches(&batches);

    let source_urls: Vec<String> = summaries.iter().map(|s| s.source_url.clone()).collect();
    let total_listings_found = summaries.iter().map(|s| s.total_listings).sum();
    let all_models = sorted_union(summaries.iter().flat_map(|s| s.common_models.iter()));
    let all_locations = sorted_union(summaries.iter().flat_map(|s| s.locations.iter()));

    let prices: Vec<f64> = all_sorted.iter().filter_map(|l| l.price_numeric).collect();
    let global_price_range = format_price_range(&prices);

    let summary = narrative(
        total_listings_found,
        source_urls.len(),
        &global_price_range,
        &top,
        &all_models,
        &all_locations,
        analyzed_at,
    );

    let status = if all_sorted.is_empty() {
        DigestStatus::NoListings
    } else {
        DigestStatus::Ok
    };

    ConsolidatedResult {
        source_urls,
        total_listings_found,
        global_price_range,
        all_models,
        all_locations,
        top,
        all_sorted,
        summary,
        status,
        analyzed_at,
    }
}

/// `"AED 45,000 - AED 120,000"`, or the no-prices marker.
pub fn format_price_range(prices: &[f64]) -> String {
    let min = prices.iter().copied().reduce(f64::min);
    let max = prices.iter().copied().reduce(f64::max);
    match (min, max) {
        (Some(lo), Some(hi)) => format!(
            "{CURRENCY} {} - {CURRENCY} {}",
            format_thousands(lo),
            format_thousands(hi)
        ),
        _ => NO_VALID_PRICES_RANGE.to_string(),
    }
}

/// Round to a whole number and group digits with commas.
pub fn format_thousands(v: f64) -> String {
    let rounded = format!("{:.0}", v.abs());
    let mut out = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, c) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if v < 0.0 && rounded != "0" {
        out.insert(0, '-');
    }
    out
}

fn sorted_union<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    items
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn narrative(
    total_listings: usize,
    source_count: usize,
    price_range: &str,
    top: &[ScoredListing],
    models: &[String],
    locations: &[String],
    analyzed_at: DateTime<Utc>,
) -> String {
    let lines: Vec<String> = top
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let year = l
                .listing
                .year
                .map_or_else(|| "Unknown year".to_string(), |y| y.to_string());
            let mileage = l.listing.mileage.as_deref().unwrap_or("Mileage unknown");
            let url = l
                .listing
                .url
                .as_deref()
                .map(|u| format!(" - {u}"))
                .unwrap_or_default();
            format!(
                "  {}. {} - {} ({}) | {} | Balance: {} (Score: {:.2}){}",
                i + 1,
                l.listing.title,
                l.listing.price,
                year,
                mileage,
                l.balance_rating,
                l.composite_score,
                url,
            )
        })
        .collect();

    format!(
        "Tesla Market Analysis Summary:\n\n\
         Found {total_listings} Tesla listings across {source_count} sources.\n\
         Price range: {price_range}\n\n\
         Top {TOP_N} \"Sweet Spot\" Tesla Models (sorted by mileage ↑, price ↑, year ↓ with balance score tie-breaker):\n\
         {}\n\n\
         Available Models: {}\n\
         Available Locations: {}\n\n\
         Analysis completed at {}\n\
         Note: Cars are ordered by preferred mileage/price/year sorting. \
         Lower balance scores indicate listings closest to the re-centered statistical sweet spot.",
        lines.join("\n"),
        models.join(", "),
        locations.join(", "),
        analyzed_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BalanceRating;

    fn listing(title: &str, price: &str, year: Option<i32>, mileage: Option<&str>) -> RawListing {
        RawListing {
            title: title.to_string(),
            price: price.to_string(),
            year,
            mileage: mileage.map(|m| m.to_string()),
            location: None,
            url: None,
            image_url: None,
        }
    }

    fn summary(url: &str, listings: Vec<RawListing>, models: &[&str], locations: &[&str]) -> SourceSummary {
        SourceSummary {
            source_url: url.to_string(),
            total_listings: listings.len(),
            price_range: String::new(),
            common_models: models.iter().map(|s| s.to_string()).collect(),
            locations: locations.iter().map(|s| s.to_string()).collect(),
            listings,
            summary: String::new(),
            analyzed_at: Utc::now(),
        }
    }

    fn titles(listings: &[ScoredListing]) -> Vec<&str> {
        listings.iter().map(|l| l.listing.title.as_str()).collect()
    }

    #[test]
    fn mileage_dominates_then_price() {
        let batch = vec![
            listing("A", "50,000", Some(2022), Some("10,000 km")),
            listing("B", "40,000", Some(2021), Some("10,000 km")),
            listing("C", "90,000", Some(2020), Some("5,000 km")),
        ];
        let ranking = rank_batches(&[batch]);
        assert_eq!(titles(&ranking.all_sorted), vec!["C", "B", "A"]);
    }

    #[test]
    fn unparseable_price_sorts_after_all_valid_prices() {
        let batch = vec![
            listing("call", "Call for price", Some(2024), Some("1,000 km")),
            listing("cheap", "AED 80,000", Some(2021), Some("1,000 km")),
            listing("dear", "AED 150,000", Some(2022), Some("1,000 km")),
        ];
        let ranking = rank_batches(&[batch]);
        assert_eq!(titles(&ranking.all_sorted), vec!["cheap", "dear", "call"]);
    }

    #[test]
    fn unknown_mileage_sorts_last() {
        let batch = vec![
            listing("unknown", "AED 10,000", Some(2024), Some("Mileage unknown")),
            listing("missing", "AED 10,000", Some(2024), None),
            listing("far", "AED 200,000", Some(2021), Some("150,000 km")),
        ];
        let ranking = rank_batches(&[batch]);
        assert_eq!(titles(&ranking.all_sorted), vec!["far", "unknown", "missing"]);
    }

    #[test]
    fn newer_year_breaks_price_tie_and_missing_year_is_last() {
        let batch = vec![
            listing("none", "AED 90,000", None, Some("8,000 km")),
            listing("old", "AED 90,000", Some(2021), Some("8,000 km")),
            listing("new", "AED 90,000", Some(2023), Some("8,000 km")),
        ];
        let ranking = rank_batches(&[batch]);
        assert_eq!(titles(&ranking.all_sorted), vec!["new", "old", "none"]);
    }

    #[test]
    fn residual_ties_keep_source_order() {
        let a = vec![listing("first", "AED 90,000", Some(2022), Some("8,000 km"))];
        let b = vec![listing("second", "AED 90,000", Some(2022), Some("8,000 km"))];
        let ranking = rank_batches(&[a, b]);
        assert_eq!(titles(&ranking.all_sorted), vec!["first", "second"]);
    }

    #[test]
    fn ranking_is_deterministic() {
        let batch: Vec<RawListing> = (0..30)
            .map(|i| {
                listing(
                    &format!("car{i}"),
                    &format!("AED {},000", 80 + (i * 7) % 50),
                    Some(2021 + i % 4),
                    Some(&format!("{},000 km", 5 + (i * 13) % 70)),
                )
            })
            .collect();
        let first = rank_batches(&[batch.clone()]);
        let second = rank_batches(&[batch]);
        assert_eq!(titles(&first.all_sorted), titles(&second.all_sorted));
    }

    #[test]
    fn top_is_a_prefix_capped_at_twenty() {
        let batch: Vec<RawListing> = (0..25)
            .map(|i| listing(&format!("car{i}"), "AED 100,000", Some(2022), Some(&format!("{} km", 1000 + i))))
            .collect();
        let ranking = rank_batches(&[batch]);
        assert_eq!(ranking.top.len(), TOP_N);
        assert_eq!(ranking.top[..], ranking.all_sorted[..TOP_N]);

        let small = rank_batches(&[vec![listing("solo", "AED 1", None, None)]]);
        assert_eq!(small.top.len(), 1);
        assert_eq!(small.top[0].balance_rating, BalanceRating::InsufficientData);
    }

    #[test]
    fn scores_use_one_shared_sample_across_sources() {
        let a = vec![listing("a", "AED 100,000", None, None)];
        let b = vec![listing("b", "AED 200,000", None, None)];
        let ranking = rank_batches(&[a, b]);
        // each batch alone would be InsufficientData
        assert!(ranking
            .all_sorted
            .iter()
            .all(|l| l.balance_rating != BalanceRating::InsufficientData));
    }

    #[test]
    fn empty_input_is_no_listings() {
        let result = consolidate(&[], Utc::now());
        assert_eq!(result.status, DigestStatus::NoListings);
        assert!(result.all_sorted.is_empty());
        assert!(result.top.is_empty());
        assert_eq!(result.global_price_range, NO_LISTINGS_RANGE);
        assert_eq!(result.summary, NO_LISTINGS_SUMMARY);
    }

    #[test]
    fn sources_without_listings_are_no_listings() {
        let result = consolidate(&[summary("https://a.example", vec![], &[], &[])], Utc::now());
        assert_eq!(result.status, DigestStatus::NoListings);
        assert_eq!(result.global_price_range, NO_VALID_PRICES_RANGE);
        assert_eq!(result.source_urls, vec!["https://a.example"]);
    }

    #[test]
    fn consolidate_aggregates_metadata() {
        let s1 = summary(
            "https://a.example",
            vec![
                listing("Model 3", "AED 95,000", Some(2022), Some("30,000 km")),
                listing("Model Y", "Call for price", Some(2023), None),
            ],
            &["Model 3", "Model Y"],
            &["Dubai"],
        );
        let s2 = summary(
            "https://b.example",
            vec![listing("Model S", "AED 1.2M", Some(2021), Some("20K miles"))],
            &["Model S", "Model 3"],
            &["Abu Dhabi", "Dubai", " "],
        );
        let result = consolidate(&[s1, s2], Utc::now());

        assert_eq!(result.status, DigestStatus::Ok);
        assert_eq!(result.total_listings_found, 3);
        assert_eq!(result.all_models, vec!["Model 3", "Model S", "Model Y"]);
        assert_eq!(result.all_locations, vec!["Abu Dhabi", "Dubai"]);
        assert_eq!(result.global_price_range, "AED 95,000 - AED 1,200,000");
        assert_eq!(titles(&result.all_sorted), vec!["Model 3", "Model S", "Model Y"]);
        assert!(result.summary.contains("Found 3 Tesla listings across 2 sources."));
        assert!(result.summary.contains("  1. Model 3 - AED 95,000 (2022) | 30,000 km | Balance: "));
        assert!(result.summary.contains("Mileage unknown"));
    }

    #[test]
    fn thousands_formatting() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(999.0), "999");
        assert_eq!(format_thousands(1000.0), "1,000");
        assert_eq!(format_thousands(45_000.4), "45,000");
        assert_eq!(format_thousands(1_234_567.0), "1,234,567");
        assert_eq!(format_price_range(&[]), NO_VALID_PRICES_RANGE);
        assert_eq!(format_price_range(&[45_000.0]), "AED 45,000 - AED 45,000");
    }
}
