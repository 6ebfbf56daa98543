use crate::normalize::{mileage_value, price_value};
use crate::scorer::stats::{valid_year, FieldStats, SampleStats};
use crate::types::{BalanceRating, RawListing, ScoredListing};

/// Score every listing against the whole sample.
///
/// Each field's z-score is re-centred on the best value observed in the
/// sample (lowest price, newest year, lowest mileage), so 0 means "as good as
/// the best listing here". The composite is the Euclidean norm of the three
/// re-centred scores. A field a listing has no valid value for contributes 0.
///
/// Samples of fewer than two listings are not standardised at all: every
/// listing gets zero scores and `InsufficientData`.
pub fn score(sample: &[RawListing]) -> Vec<ScoredListing> {
    if sample.len() < 2 {
        return sample.iter().map(insufficient).collect();
    }

    let stats = SampleStats::from_listings(sample);
    let anchors = Anchors::from_stats(&stats);

    sample
        .iter()
        .map(|listing| {
            let price = price_value(&listing.price);
            let mileage = listing.mileage.as_deref().and_then(mileage_value);
            let year = valid_year(listing);

            let price_z = recentered(price, &stats.price, anchors.price);
            let year_z = recentered(year, &stats.year, anchors.year);
            let mileage_z = recentered(mileage, &stats.mileage, anchors.mileage);

            let composite_score = (price_z.powi(2) + year_z.powi(2) + mileage_z.powi(2)).sqrt();

            ScoredListing {
                listing: listing.clone(),
                price_numeric: price,
                mileage_numeric: mileage,
                price_z,
                year_z,
                mileage_z,
                composite_score,
                balance_rating: BalanceRating::from_score(composite_score),
            }
        })
        .collect()
}

/// Raw z-scores of the sample's most desirable observed values.
struct Anchors {
    price: f64,
    year: f64,
    mileage: f64,
}

impl Anchors {
    fn from_stats(stats: &SampleStats) -> Self {
        let anchor = |field: &FieldStats, best: Option<f64>| best.map_or(0.0, |v| field.z(v));
        Self {
            price: anchor(&stats.price, stats.price.min),
            year: anchor(&stats.year, stats.year.max),
            mileage: anchor(&stats.mileage, stats.mileage.min),
        }
    }
}

fn recentered(value: Option<f64>, field: &FieldStats, anchor_z: f64) -> f64 {
    match value {
        Some(v) if field.stdev > 0.0 && field.stdev.is_finite() => field.z(v) - anchor_z,
        _ => 0.0,
    }
}

fn insufficient(listing: &RawListing) -> ScoredListing {
    ScoredListing {
        listing: listing.clone(),
        price_numeric: price_value(&listing.price),
        mileage_numeric: listing.mileage.as_deref().and_then(mileage_value),
        price_z: 0.0,
        year_z: 0.0,
        mileage_z: 0.0,
        composite_score: 0.0,
        balance_rating: BalanceRating::InsufficientData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn sample() -> Vec<RawListing> {
        vec![
            listing("A", "AED 120,000", Some(2023), Some("15,000 km")),
            listing("B", "AED 95,000", Some(2021), Some("60,000 km")),
            listing("C", "AED 105,000", Some(2022), Some("30,000 km")),
            listing("D", "Call for price", None, Some("Mileage unknown")),
            listing("E", "AED 140,000", Some(2024), Some("5,000 km")),
        ]
    }

    #[test]
    fn single_listing_is_insufficient_data() {
        let scored = score(&[listing("A", "AED 100,000", Some(2022), Some("10,000 km"))]);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].balance_rating, BalanceRating::InsufficientData);
        assert_eq!(scored[0].composite_score, 0.0);
        assert_eq!(scored[0].price_z, 0.0);
        assert_eq!(scored[0].price_numeric, Some(100_000.0));
    }

    #[test]
    fn empty_sample_scores_nothing() {
        assert!(score(&[]).is_empty());
    }

    #[test]
    fn best_values_anchor_at_zero() {
        let scored = score(&sample());
        let by_title = |t: &str| scored.iter().find(|s| s.listing.title == t).unwrap();

        // cheapest
        assert!(by_title("B").price_z.abs() < 1e-9);
        // newest and lowest mileage
        assert!(by_title("E").year_z.abs() < 1e-9);
        assert!(by_title("E").mileage_z.abs() < 1e-9);
    }

    #[test]
    fn recentred_scores_point_away_from_the_ideal() {
        let scored = score(&sample());
        for s in scored.iter().filter(|s| s.listing.title != "D") {
            assert!(s.price_z >= -1e-9, "{} price_z {}", s.listing.title, s.price_z);
            assert!(s.year_z <= 1e-9, "{} year_z {}", s.listing.title, s.year_z);
            assert!(s.mileage_z >= -1e-9, "{} mileage_z {}", s.listing.title, s.mileage_z);
        }
    }

    #[test]
    fn invalid_fields_contribute_zero() {
        let scored = score(&sample());
        let d = scored.iter().find(|s| s.listing.title == "D").unwrap();
        assert_eq!(d.price_z, 0.0);
        assert_eq!(d.year_z, 0.0);
        assert_eq!(d.mileage_z, 0.0);
        assert_eq!(d.composite_score, 0.0);
        assert!(d.price_numeric.is_none());
        assert!(d.mileage_numeric.is_none());
    }

    #[test]
    fn composite_is_euclidean_and_non_negative() {
        for s in score(&sample()) {
            let expected = (s.price_z.powi(2) + s.year_z.powi(2) + s.mileage_z.powi(2)).sqrt();
            assert!((s.composite_score - expected).abs() < 1e-9);
            assert!(s.composite_score >= 0.0);
            assert_eq!(s.balance_rating, BalanceRating::from_score(s.composite_score));
        }
    }

    #[test]
    fn identical_values_have_zero_spread() {
        let scored = score(&[
            listing("A", "AED 100,000", Some(2022), Some("10,000 km")),
            listing("B", "AED 100,000", Some(2022), Some("10,000 km")),
        ]);
        for s in &scored {
            assert_eq!(s.composite_score, 0.0);
            assert_eq!(s.balance_rating, BalanceRating::SweetSpot);
        }
    }

    #[test]
    fn two_listing_sample_matches_hand_computation() {
        // prices 100k / 200k: mean 150k, stdev 70710.678..., z = ∓0.7071
        // the cheap one anchors at 0, the other sits sqrt(2) away
        let scored = score(&[
            listing("cheap", "100K", None, None),
            listing("dear", "200K", None, None),
        ]);
        assert!(scored[0].price_z.abs() < 1e-9);
        assert!((scored[1].price_z - 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(scored[0].balance_rating, BalanceRating::SweetSpot);
        assert_eq!(scored[1].balance_rating, BalanceRating::Balanced);
    }

    #[test]
    fn field_with_one_valid_value_scores_zero() {
        let scored = score(&[
            listing("dated", "AED 90,000", Some(2022), Some("40,000 km")),
            listing("undated", "AED 110,000", None, Some("20,000 km")),
            listing("old", "AED 70,000", Some(1998), Some("90,000 km")),
        ]);
        for s in &scored {
            assert_eq!(s.year_z, 0.0, "{}", s.listing.title);
        }
        // the other fields still spread
        assert!(scored.iter().any(|s| s.price_z > 0.0));
        assert!(scored.iter().any(|s| s.mileage_z > 0.0));
    }

    #[test]
    fn extreme_finite_prices_keep_scores_finite() {
        let scored = score(&[
            listing("a", "1e308", None, None),
            listing("b", "1e308", None, None),
        ]);
        for s in &scored {
            assert_eq!(s.composite_score, 0.0);
            assert_eq!(s.balance_rating, BalanceRating::SweetSpot);
        }

        let scored = score(&[
            listing("a", "1.7e308", None, None),
            listing("b", "1e307", None, None),
        ]);
        for s in &scored {
            assert!(s.composite_score.is_finite() && s.composite_score >= 0.0);
        }
    }
}
