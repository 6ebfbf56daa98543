use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror the digest history rows)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct RunResponse {
    pub id: i64,
    pub analyzed_at: i64,
    pub status: String,
    pub sources: i64,
    pub total_listings: i64,
    pub ranked_listings: i64,
    pub price_range: String,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ListingResponse {
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

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct HealthResponse {
    pub runs: i64,
    pub last_run_at: Option<i64>,
    pub digest_running: bool,
    pub last_digest_at: Option<u64>,
    pub last_failed_sources: u64,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub run: Option<RunResponse>,
    pub listings: Vec<ListingResponse>,
    pub health: HealthResponse,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            run: None,
            listings: Vec::new(),
            health: HealthResponse::default(),
            base_url,
        }
    }

    pub fn selected_listing(&self, selected: Option<usize>) -> Option<&ListingResponse> {
        selected.and_then(|i| self.listings.get(i))
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let latest_url = format!("{}/runs/latest", self.base_url);
        let health_url = format!("{}/health", self.base_url);

        let (latest_res, health_res) =
            tokio::join!(client.get(&latest_url).send(), client.get(&health_url).send());

        let run = match latest_res {
            Ok(resp) => match resp.json::<Option<RunResponse>>().await {
                Ok(run) => run,
                Err(e) => {
                    self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                    return;
                }
            },
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        if let Ok(h) = health_res {
            if let Ok(health) = h.json::<HealthResponse>().await {
                self.health = health;
            }
        }

        let Some(run) = run else {
            self.run = None;
            self.listings.clear();
            self.status = ConnectionStatus::Connected;
            return;
        };

        // Listings only change when a new run lands.
        if self.run.as_ref().map(|r| r.id) != Some(run.id) || self.listings.is_empty() {
            let listings_url = format!("{}/runs/{}/listings?limit=500", self.base_url, run.id);
            match client.get(&listings_url).send().await {
                Ok(resp) => match resp.json::<Vec<ListingResponse>>().await {
                    Ok(listings) => self.listings = listings,
                    Err(e) => {
                        self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                        return;
                    }
                },
                Err(e) => {
                    self.status = ConnectionStatus::Error(format!("{e}"));
                    return;
                }
            }
        }

        self.run = Some(run);
        self.status = ConnectionStatus::Connected;
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_year(year: Option<i64>) -> String {
    year.map_or("—".to_string(), |y| y.to_string())
}

pub fn format_score(score: f64) -> String {
    format!("{score:.2}")
}

/// Nanosecond epoch timestamp as "YYYY-MM-DD HH:MM UTC".
pub fn format_time_ns(ns: i64) -> String {
    chrono::DateTime::from_timestamp_nanos(ns)
        .format("%Y-%m-%d %H:%M UTC")
        .to_string()
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("Model 3", 10), "Model 3");
        assert_eq!(truncate("Model Y Long Range", 8), "Model Y…");
        assert_eq!(truncate("درهم درهم", 5), "درهم…");
    }

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(format_time_ns(0), "1970-01-01 00:00 UTC");
        assert_eq!(format_time_ns(1_700_000_000_000_000_000), "2023-11-14 22:13 UTC");
    }

    #[test]
    fn missing_year_renders_dash() {
        assert_eq!(format_year(None), "—");
        assert_eq!(format_year(Some(2022)), "2022");
        assert_eq!(format_score(0.4567), "0.46");
    }

    #[test]
    fn latest_run_null_deserializes() {
        let run: Option<RunResponse> = serde_json::from_str("null").unwrap();
        assert!(run.is_none());
        let app = AppState::new("http://localhost:3000".to_string());
        assert!(app.selected_listing(Some(0)).is_none());
    }
}
