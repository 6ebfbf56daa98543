use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::{RawListing, SourceSummary};

const SYSTEM_PROMPT: &str = "You are a Tesla car shopping assistant. Use the available web scraping \
tools to fetch Tesla search results and extract structured information about available Tesla vehicles. \
For each listing extract the title, price, year, mileage, location, the direct listing URL and the main \
image URL. Mileage formats vary (e.g. \"45,000 km\", \"28K miles\", \"30,000\"): preserve the format as \
shown. Identify the most common models (Model 3, Model Y, Model S, Model X), the price range and the \
locations. Reply with a single JSON object and nothing else.";

const RESPONSE_SHAPE: &str = r#"{
  "total_listings": <integer>,
  "price_range": "<e.g. AED 45,000 - AED 120,000>",
  "common_models": ["<model>", ...],
  "locations": ["<city or dealer>", ...],
  "listings": [
    {"title": "<string>", "price": "<string>", "year": <integer|null>, "mileage": "<string|null>",
     "location": "<string|null>", "url": "<string|null>", "image_url": "<string|null>"}
  ],
  "summary": "<short daily digest text>"
}"#;

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

/// Outcome counts for one concurrent acquisition batch.
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
}

/// Client for the OpenAI-compatible listing agent.
#[derive(Clone)]
pub struct AgentClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl AgentClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.agent_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: cfg.agent_api_url.trim_end_matches('/').to_string(),
            model: cfg.agent_model.clone(),
            api_key: cfg.agent_api_key.clone(),
        })
    }

    /// Ask the agent to scrape one marketplace search and summarise it.
    pub async fn fetch_source(&self, url: &str) -> Result<SourceSummary> {
        info!(url = %url, "fetching listings");
        let started = Instant::now();

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(url),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(AppError::Agent(format!("agent returned {status}: {snippet}")));
        }

        let data: ChatCompletionResponse = resp.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Agent("no content in agent response".to_string()))?;

        let summary = parse_summary(url, &content)?;
        info!(
            url = %url,
            listings = summary.listings.len(),
            reported = summary.total_listings,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "fetched {} listings from {url}",
            summary.listings.len(),
        );
        Ok(summary)
    }

    /// Fetch every URL concurrently. Failed sources are logged and dropped;
    /// the survivors come back in URL order.
    pub async fn fetch_all(&self, urls: &[String]) -> (Vec<SourceSummary>, BatchStats) {
        let started = Instant::now();
        info!(sources = urls.len(), "starting batch of {} sources", urls.len());

        let results = join_all(urls.iter().map(|url| self.fetch_source(url))).await;

        let mut stats = BatchStats {
            requested: urls.len(),
            ..Default::default()
        };
        let mut summaries = Vec::with_capacity(urls.len());
        for (i, (url, result)) in urls.iter().zip(results).enumerate() {
            match result {
                Ok(summary) => {
                    stats.succeeded += 1;
                    debug!(url = %url, batch_index = i, "source ok");
                    summaries.push(summary);
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(url = %url, batch_index = i, "failed to process source: {e}");
                }
            }
        }
        stats.elapsed_secs = started.elapsed().as_secs_f64();

        if stats.failed > 0 {
            warn!(
                succeeded = stats.succeeded,
                failed = stats.failed,
                "batch finished with {} failed sources",
                stats.failed,
            );
        }
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            elapsed_secs = stats.elapsed_secs,
            "batch complete: {}/{} sources in {:.1}s",
            stats.succeeded,
            stats.requested,
            stats.elapsed_secs,
        );

        (summaries, stats)
    }
}

fn build_prompt(url: &str) -> String {
    format!(
        "Please fetch and analyze Tesla search results from: {url}\n\n\
         1. Fetch the URL with JavaScript rendering enabled.\n\
         2. Extract every Tesla listing from the rendered content.\n\
         3. Answer with JSON shaped exactly like this:\n{RESPONSE_SHAPE}"
    )
}

/// Turn the agent's reply into a typed summary.
///
/// Markdown code fences are tolerated. Each listing is checked against the
/// input contract; one bad record fails the whole source.
pub fn parse_summary(url: &str, content: &str) -> Result<SourceSummary> {
    let clean = strip_code_fence(content);
    let v: serde_json::Value = serde_json::from_str(clean)?;

    let listings = match v.get("listings") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| RawListing::from_value(i, item))
            .collect::<Result<Vec<_>>>()?,
        Some(serde_json::Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(AppError::Validation(format!(
                "`listings` must be an array, got {other}"
            )))
        }
    };

    let string_list = |field: &str| -> Vec<String> {
        v.get(field)
            .and_then(|a| a.as_array())
            .map(|a| a.iter().filter_map(|s| s.as_str()).map(|s| s.to_string()).collect())
            .unwrap_or_default()
    };
    let text = |field: &str| -> String {
        v.get(field)
            .and_then(|s| s.as_str())
            .unwrap_or("")
            .to_string()
    };

    let total_listings = v
        .get("total_listings")
        .and_then(|n| n.as_u64())
        .map(|n| n as usize)
        .unwrap_or(listings.len());

    Ok(SourceSummary {
        source_url: url.to_string(),
        total_listings,
        price_range: text("price_range"),
        common_models: string_list("common_models"),
        locations: string_list("locations"),
        listings,
        summary: text("summary"),
        analyzed_at: Utc::now(),
    })
}

fn strip_code_fence(s: &str) -> &str {
    s.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_agent_reply() {
        let reply = "```json\n{\"total_listings\": 12, \"price_range\": \"AED 90,000 - AED 150,000\", \
                     \"common_models\": [\"Model 3\"], \"locations\": [\"Dubai\"], \
                     \"listings\": [{\"title\": \"Tesla Model 3\", \"price\": \"AED 95,000\", \"year\": 2022, \
                     \"mileage\": \"30,000 km\", \"location\": \"Dubai\", \"url\": null, \"image_url\": null}], \
                     \"summary\": \"one car\", \"source_url\": \"https://elsewhere.example\"}\n```";
        let s = parse_summary("https://a.example/search", reply).unwrap();
        assert_eq!(s.source_url, "https://a.example/search");
        assert_eq!(s.total_listings, 12);
        assert_eq!(s.common_models, vec!["Model 3"]);
        assert_eq!(s.listings.len(), 1);
        assert_eq!(s.listings[0].year, Some(2022));
        assert_eq!(s.listings[0].mileage.as_deref(), Some("30,000 km"));
    }

    #[test]
    fn missing_count_defaults_to_listing_count() {
        let reply = r#"{"listings": [{"title": "Model Y", "price": "AED 1"}, {"title": "Model S", "price": ""}]}"#;
        let s = parse_summary("u", reply).unwrap();
        assert_eq!(s.total_listings, 2);
        assert!(s.locations.is_empty());
        assert_eq!(s.summary, "");
    }

    #[test]
    fn record_without_title_fails_the_source() {
        let reply = r#"{"listings": [{"title": "Model Y", "price": "AED 1"}, {"price": "AED 2"}]}"#;
        let err = parse_summary("u", reply).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("#1") && m.contains("title")));
    }

    #[test]
    fn non_json_reply_is_an_error() {
        assert!(matches!(parse_summary("u", "sorry, I can't"), Err(AppError::Json(_))));
    }

    #[test]
    fn non_array_listings_is_a_validation_error() {
        assert!(matches!(
            parse_summary("u", r#"{"listings": "none"}"#),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn prompt_names_the_url() {
        assert!(build_prompt("https://a.example/x").contains("https://a.example/x"));
    }

    #[tokio::test]
    async fn fetch_all_drops_failed_sources() {
        let base = mock::spawn_agent().await;
        let client = AgentClient::new(&mock::test_config(base)).unwrap();
        let urls = vec![
            "https://a.example/search".to_string(),
            "https://broken.example/search".to_string(),
            "https://c.example/search".to_string(),
        ];
        let (summaries, stats) = client.fetch_all(&urls).await;

        assert_eq!(stats.requested, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        let sources: Vec<&str> = summaries.iter().map(|s| s.source_url.as_str()).collect();
        assert_eq!(sources, vec!["https://a.example/search", "https://c.example/search"]);
        assert_eq!(summaries[0].listings[0].title, "Tesla Model 3");
    }
}
