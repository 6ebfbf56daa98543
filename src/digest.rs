use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::Config;
use crate::db::DigestWriter;
use crate::error::Result;
use crate::fetcher::AgentClient;
use crate::ranker::consolidate;
use crate::report::{build_report, write_report};
use crate::types::{ConsolidatedResult, DigestStatus};

/// Fetch → consolidate → report → persist, once or on a schedule.
pub struct DigestRunner {
    agent: AgentClient,
    writer: DigestWriter,
    health: Arc<HealthState>,
    urls: Vec<String>,
    report_path: PathBuf,
    interval_secs: u64,
}

impl DigestRunner {
    pub fn new(
        cfg: &Config,
        agent: AgentClient,
        writer: DigestWriter,
        health: Arc<HealthState>,
        urls: Vec<String>,
    ) -> Self {
        Self {
            agent,
            writer,
            health,
            urls,
            report_path: PathBuf::from(&cfg.report_path),
            interval_secs: cfg.digest_interval_secs,
        }
    }

    /// Run immediately, then every `interval_secs` (never again when 0).
    pub async fn run(self) {
        if self.interval_secs == 0 {
            if let Err(e) = self.run_once().await {
                error!("Digest failed: {e}");
            }
            return;
        }

        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!("Digest failed: {e}");
            }
        }
    }

    pub async fn run_once(&self) -> Result<ConsolidatedResult> {
        self.health.set_digest_running(true);
        let outcome = self.digest().await;
        self.health.set_digest_running(false);
        outcome
    }

    async fn digest(&self) -> Result<ConsolidatedResult> {
        info!(sources = self.urls.len(), "starting digest of {} sources", self.urls.len());

        let (summaries, stats) = self.agent.fetch_all(&self.urls).await;
        let result = consolidate(&summaries, Utc::now());

        if result.status == DigestStatus::NoListings {
            warn!("No Tesla listings found. Check URLs and agent connectivity.");
        }

        write_report(&self.report_path, &build_report(&result)).await?;
        let run_id = self.writer.write_run(&result).await?;

        let at_ns = result.analyzed_at.timestamp_nanos_opt().unwrap_or_default().max(0) as u64;
        self.health.record_digest(at_ns, stats.failed as u64);

        info!(
            run_id,
            total_listings = result.total_listings_found,
            ranked = result.all_sorted.len(),
            top = result.top.len(),
            price_range = %result.global_price_range,
            "digest complete: {} listings ranked, range {}",
            result.all_sorted.len(),
            result.global_price_range,
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, queries};
    use crate::fetcher::mock;

    async fn runner(name: &str, urls: &[&str]) -> (DigestRunner, sqlx::SqlitePool, PathBuf) {
        let base = mock::spawn_agent().await;
        let mut cfg = mock::test_config(base);
        let dir = std::env::temp_dir().join(format!("tesla-finder-digest-{name}-{}", std::process::id()));
        let report = dir.join("listings.json");
        cfg.report_path = report.display().to_string();

        let pool = memory_pool().await;
        let runner = DigestRunner::new(
            &cfg,
            AgentClient::new(&cfg).unwrap(),
            DigestWriter::new(pool.clone()),
            Arc::new(HealthState::new()),
            urls.iter().map(|u| u.to_string()).collect(),
        );
        (runner, pool, dir)
    }

    #[tokio::test]
    async fn run_once_reports_persists_and_counts_failures() {
        let (runner, pool, dir) = runner(
            "once",
            &["https://a.example/s", "https://broken.example/s", "https://c.example/s"],
        )
        .await;

        let result = runner.run_once().await.unwrap();
        assert_eq!(result.status, DigestStatus::Ok);
        assert_eq!(result.all_sorted.len(), 2);

        let report = tokio::fs::read_to_string(dir.join("listings.json")).await.unwrap();
        assert!(report.contains("Tesla Model 3"));

        let latest = queries::latest_run(&pool).await.unwrap().unwrap();
        assert_eq!(latest.status, "ok");
        assert_eq!(latest.ranked_listings, 2);

        assert!(!runner.health.digest_running());
        assert!(runner.health.last_digest_at_ns() > 0);
        assert_eq!(runner.health.last_failed_sources(), 1);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn empty_digest_still_writes_report_and_history() {
        let (runner, pool, dir) = runner("empty", &["https://empty.example/s"]).await;

        let result = runner.run_once().await.unwrap();
        assert_eq!(result.status, DigestStatus::NoListings);
        assert!(tokio::fs::try_exists(dir.join("listings.json")).await.unwrap());

        let latest = queries::latest_run(&pool).await.unwrap().unwrap();
        assert_eq!(latest.status, "no_listings");
        assert_eq!(latest.ranked_listings, 0);
        assert_eq!(runner.health.last_failed_sources(), 0);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn zero_interval_runs_exactly_once() {
        let (runner, pool, dir) = runner("zero", &["https://a.example/s"]).await;
        assert_eq!(runner.interval_secs, 0);

        tokio::time::timeout(Duration::from_secs(10), runner.run())
            .await
            .expect("runner should return when the interval is 0");
        assert_eq!(queries::run_count(&pool).await.unwrap(), 1);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
