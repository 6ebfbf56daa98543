use crate::error::{AppError, Result};

pub const AGENT_API_URL: &str = "https://api.openai.com";
pub const AGENT_MODEL: &str = "gpt-5-mini";

/// Marketplace searches used when `SEARCH_URLS` is not set.
pub const DEFAULT_SEARCH_URLS: &[&str] = &[
    "https://dubai.dubizzle.com/motors/used-cars/tesla/?sorting=price_asc&year__gte=2021&year__lte=2026&regional_specs=824",
    "https://carswitch.com/uae/used-cars/search?make=tesla&minyear=2021&maxyear=2025&sort=price_low_high",
    "https://www.kavak.com/ae/preowned?year=2021,2022,2023,2024&keyword=tesla&order=lower_price&page=0",
];

/// Currency label used when rendering price ranges.
pub const CURRENCY: &str = "AED";

/// Mileage sentinel. Anything at or above this is "unknown".
pub const MILEAGE_UNKNOWN: f64 = 999_999.0;

/// Miles → kilometres.
pub const MILES_TO_KM: f64 = 1.6;

/// Years at or below this are not counted as valid.
pub const MIN_VALID_YEAR: i32 = 2000;

/// Headline slice of the ranked list.
pub const TOP_N: usize = 20;

/// Composite score thresholds (inclusive upper bounds).
pub mod rating_thresholds {
    pub const SWEET_SPOT_MAX: f64 = 0.75;
    pub const BALANCED_MAX: f64 = 1.5;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// OpenAI-compatible base URL of the listing agent (AGENT_API_URL)
    pub agent_api_url: String,
    /// Bearer token (AGENT_API_KEY, falls back to OPENAI_API_KEY)
    pub agent_api_key: Option<String>,
    pub agent_model: String,
    /// Per-source request timeout (AGENT_TIMEOUT_SECS)
    pub agent_timeout_secs: u64,
    /// Marketplace searches to digest (SEARCH_URLS, comma-separated)
    pub search_urls: Vec<String>,
    /// Where the JSON report lands (REPORT_PATH)
    pub report_path: String,
    /// Serve-mode digest period; 0 runs once (DIGEST_INTERVAL_SECS)
    pub digest_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "tesla_finder.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            agent_api_url: std::env::var("AGENT_API_URL")
                .unwrap_or_else(|_| AGENT_API_URL.to_string()),
            agent_api_key: std::env::var("AGENT_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            agent_model: std::env::var("AGENT_MODEL").unwrap_or_else(|_| AGENT_MODEL.to_string()),
            agent_timeout_secs: std::env::var("AGENT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "180".to_string())
                .parse::<u64>()
                .unwrap_or(180),
            search_urls: std::env::var("SEARCH_URLS")
                .map(|s| split_urls(&s))
                .unwrap_or_else(|_| default_search_urls()),
            report_path: std::env::var("REPORT_PATH")
                .unwrap_or_else(|_| "public/listings.json".to_string()),
            digest_interval_secs: std::env::var("DIGEST_INTERVAL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse::<u64>()
                .unwrap_or(86_400),
        })
    }
}

pub fn default_search_urls() -> Vec<String> {
    DEFAULT_SEARCH_URLS.iter().map(|s| s.to_string()).collect()
}

/// Split a comma-separated URL list, dropping blanks.
pub fn split_urls(s: &str) -> Vec<String> {
    s.split(',')
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_urls_trims_and_drops_blanks() {
        let urls = split_urls(" https://a.example/x , ,https://b.example/y,");
        assert_eq!(urls, vec!["https://a.example/x", "https://b.example/y"]);
    }

    #[test]
    fn default_urls_are_three_marketplaces() {
        assert_eq!(default_search_urls().len(), 3);
    }
}
