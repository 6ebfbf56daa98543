mod api;
mod config;
mod db;
mod digest;
mod error;
mod fetcher;
mod normalize;
mod ranker;
mod report;
mod scorer;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::{split_urls, Config};
use crate::db::DigestWriter;
use crate::digest::DigestRunner;
use crate::error::Result;
use crate::fetcher::AgentClient;
use crate::normalize::{parse_mileage, parse_price};
use crate::ranker::consolidate::format_thousands;
use crate::types::{ConsolidatedResult, SourceSummary};

#[derive(Parser)]
#[command(name = "tesla-finder", version, about = "Daily digest of used Tesla listings in the UAE")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Fetch every source, rank the combined listings and persist the run
    Digest {
        /// Also write the consolidated result as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Comma-separated search URLs (default: SEARCH_URLS or the built-in list)
        #[arg(long)]
        urls: Option<String>,
    },
    /// Analyze a single search URL without ranking or persisting
    Search {
        url: String,

        /// Write the source summary as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the configured search URLs
    Urls,
    /// Run the digest on a schedule and expose the history over HTTP
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cli.command, cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, cfg: Config) -> Result<()> {
    match command {
        Commands::Digest { output, urls } => {
            let urls = urls.map(|u| split_urls(&u)).unwrap_or_else(|| cfg.search_urls.clone());
            let result = digest_once(&cfg, urls).await?;
            print_digest(&result);
            if let Some(path) = output {
                write_json(&path, &result).await?;
            }
        }
        Commands::Search { url, output } => {
            let agent = AgentClient::new(&cfg)?;
            let summary = agent.fetch_source(&url).await?;
            print_source(&summary);
            if let Some(path) = output {
                write_json(&path, &summary).await?;
            }
        }
        Commands::Urls => {
            println!("Tesla search URLs:");
            for (i, url) in cfg.search_urls.iter().enumerate() {
                println!("  {}. {url}", i + 1);
            }
        }
        Commands::Serve => serve(cfg).await?,
    }
    Ok(())
}

async fn digest_once(cfg: &Config, urls: Vec<String>) -> Result<ConsolidatedResult> {
    let pool = db::connect(&cfg.db_path).await?;
    let runner = DigestRunner::new(
        cfg,
        AgentClient::new(cfg)?,
        DigestWriter::new(pool),
        Arc::new(HealthState::new()),
        urls,
    );
    runner.run_once().await
}

async fn serve(cfg: Config) -> Result<()> {
    let pool = db::connect(&cfg.db_path).await?;
    let health = Arc::new(HealthState::new());

    // Digest runner (background, immediately then every DIGEST_INTERVAL_SECS)
    let runner = DigestRunner::new(
        &cfg,
        AgentClient::new(&cfg)?,
        DigestWriter::new(pool.clone()),
        Arc::clone(&health),
        cfg.search_urls.clone(),
    );
    tokio::spawn(async move { runner.run().await });

    // HTTP API server
    let app = router(ApiState { pool, health });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body).await?;
    info!("Results saved to {}", path.display());
    Ok(())
}

fn print_digest(result: &ConsolidatedResult) {
    println!("Tesla digest ({} sources)", result.source_urls.len());
    println!("  Total listings: {}", result.total_listings_found);
    println!("  Price range:    {}", result.global_price_range);
    println!("  Models:         {}", result.all_models.join(", "));
    println!("  Locations:      {}", result.all_locations.join(", "));
    println!();

    for (i, l) in result.top.iter().enumerate() {
        println!(
            "{:>2}. {} | {} | {} | {} | {} ({:.2})",
            i + 1,
            l.listing.title,
            l.listing.price,
            l.listing.year.map(|y| y.to_string()).unwrap_or_else(|| "n/a".to_string()),
            l.listing.mileage.as_deref().unwrap_or("n/a"),
            l.balance_rating,
            l.composite_score,
        );
    }
    println!();
    println!("{}", result.summary);
}

fn print_source(summary: &SourceSummary) {
    println!("{}", summary.source_url);
    println!("  Listings:    {}", summary.total_listings);
    println!("  Price range: {}", summary.price_range);
    println!("  Models:      {}", summary.common_models.join(", "));
    println!("  Locations:   {}", summary.locations.join(", "));
    for l in &summary.listings {
        let price = match parse_price(&l.price) {
            p if p > 0.0 => format!("{} {}", config::CURRENCY, format_thousands(p)),
            _ => "price n/a".to_string(),
        };
        let mileage = match l.mileage.as_deref().map(parse_mileage) {
            Some(km) if km < config::MILEAGE_UNKNOWN => format!("{} km", format_thousands(km)),
            _ => "mileage n/a".to_string(),
        };
        println!("  - {} | {price} | {mileage}", l.title);
    }
    println!();
    println!("{}", summary.summary);
}
