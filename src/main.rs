// Engagic CLI - ingestion pipeline entry points
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use engagic::pipeline::fetcher::Fetcher;
use engagic::pipeline::rate_limit::VendorRateLimiter;
use engagic::repository::cities::{CityFilters, CityRepo};
use engagic::{init_logging, Banana, Conductor, Config, LlmSummarizer, MatterRepo, Summarizer};

#[derive(Parser)]
#[command(name = "engagic", version, about = "Civic meeting ingestion and processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the conductor: scheduler, fetcher pool, processor pool.
    Serve,
    /// Sync one city immediately, outside the queue.
    Sync {
        /// City identifier, e.g. paloaltoCA
        banana: String,
    },
    /// Import a city seed file (CSV or JSON).
    ImportCities {
        /// Path to the seed file.
        path: PathBuf,
    },
    /// Queue depth and city catalogue statistics.
    Stats,
    /// Check matter-tracking integrity invariants.
    Validate,
    /// Apply pending database migrations and exit.
    Migrate,
}

fn main() -> ExitCode {
    // Config errors are fatal before anything else starts.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let cli = Cli::parse();

    let max_connections = (config.fetcher_workers + config.processor_workers + 4) as u32;
    let pool = engagic::connect(&config.db_url, max_connections)
        .await
        .context("database connection failed")?;
    engagic::migrate(&pool).await.context("migration failed")?;

    match cli.command {
        Command::Serve => {
            let summarizer = build_summarizer(&config)?;
            Conductor::new(pool, config, summarizer).run().await?;
        }
        Command::Sync { banana } => {
            let banana = Banana::parse(&banana)
                .with_context(|| format!("{banana:?} is not a valid city identifier"))?;
            let rate_limiter = Arc::new(VendorRateLimiter::new(config.vendor_min_delay));
            let fetcher = Fetcher::new(pool, config, rate_limiter);
            let stats = fetcher.sync_city(&banana).await?;
            println!(
                "fetched {} meetings ({} stored, {} unchanged, {} queued for processing)",
                stats.fetched, stats.stored, stats.skipped_unchanged, stats.enqueued
            );
        }
        Command::ImportCities { path } => {
            let report = engagic::seed::import_cities(&pool, &path).await?;
            println!("imported {} cities", report.imported);
            for skipped in &report.skipped {
                println!("  skipped {skipped}");
            }
        }
        Command::Stats => {
            let stats = Conductor::stats(&pool).await?;
            let mut conn = pool.acquire().await?;
            let cities = CityRepo::get_cities(&mut conn, &CityFilters::default()).await?;
            println!("cities:      {}", cities.len());
            println!("pending:     {}", stats.pending);
            println!("processing:  {}", stats.processing);
            println!("completed:   {}", stats.completed);
            println!("dead_letter: {}", stats.dead_letter);
            if let Some(age) = stats.oldest_pending_age_secs {
                println!("oldest pending job: {age}s");
            }
        }
        Command::Validate => {
            let mut conn = pool.acquire().await?;
            let problems = MatterRepo::validate_matter_tracking(&mut conn).await?;
            if problems.is_empty() {
                println!("matter tracking is consistent");
            } else {
                for problem in &problems {
                    println!("{problem}");
                }
                anyhow::bail!("{} integrity problems found", problems.len());
            }
        }
        Command::Migrate => {
            println!("migrations applied");
        }
    }
    Ok(())
}

fn build_summarizer(config: &Config) -> Result<Arc<dyn Summarizer>> {
    let api_key = config
        .llm_api_key
        .as_deref()
        .context("LLM_API_KEY is required to run processing workers")?;
    let summarizer = LlmSummarizer::new(&config.llm_api_base, api_key, config.llm_timeout)
        .map_err(|e| anyhow::anyhow!("summarizer construction failed: {e}"))?;
    Ok(Arc::new(summarizer))
}
