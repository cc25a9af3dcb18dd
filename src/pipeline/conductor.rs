// The conductor: periodic scheduling, worker supervision, stuck-job
// recovery. Workers are long-lived loops pulling from the shared queue;
// shutdown is cooperative, checked between jobs, with a bounded drain.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::errors::{DatabaseError, JobError};
use crate::repository::cities::CityRepo;
use crate::repository::queue::{ClaimedJob, QueueRepo, QueueStats, SYNC_PRIORITY};
use crate::repository::transaction;
use crate::summarizer::Summarizer;
use crate::types::{Banana, JobKind};

use super::fetcher::Fetcher;
use super::processor::Processor;
use super::rate_limit::VendorRateLimiter;

/// How long workers get to finish their current job on shutdown.
const DRAIN_WINDOW: Duration = Duration::from_secs(30);

/// Idle poll delay when the queue is empty.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Conductor {
    pool: PgPool,
    config: Config,
    summarizer: Arc<dyn Summarizer>,
}

impl Conductor {
    pub fn new(pool: PgPool, config: Config, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            pool,
            config,
            summarizer,
        }
    }

    /// Run until interrupted: scheduler + sweeper + both worker pools.
    pub async fn run(self) -> Result<(), JobError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let rate_limiter = Arc::new(VendorRateLimiter::new(self.config.vendor_min_delay));

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        // Fetcher pool: small, bounded by politeness.
        let fetcher = Arc::new(Fetcher::new(
            self.pool.clone(),
            self.config.clone(),
            rate_limiter.clone(),
        ));
        for worker_id in 0..self.config.fetcher_workers {
            let fetcher = fetcher.clone();
            let pool = self.pool.clone();
            let rx = shutdown_rx.clone();
            let max_attempts = self.config.job_max_attempts;
            handles.push(tokio::spawn(async move {
                worker_loop(
                    &format!("fetcher-{worker_id}"),
                    pool,
                    &[JobKind::SyncCity],
                    rx,
                    max_attempts,
                    |job| {
                        let fetcher = fetcher.clone();
                        async move {
                            let banana = Banana::parse(&job.payload)
                                .map_err(JobError::Validation)?;
                            fetcher.sync_city(&banana).await.map(|_| ())
                        }
                    },
                )
                .await;
            }));
        }

        // Processor pool: larger, bounded by LLM rate.
        let processor = Arc::new(Processor::new(
            self.pool.clone(),
            &self.config,
            self.summarizer.clone(),
        )?);
        for worker_id in 0..self.config.processor_workers {
            let processor = processor.clone();
            let pool = self.pool.clone();
            let rx = shutdown_rx.clone();
            let max_attempts = self.config.job_max_attempts;
            handles.push(tokio::spawn(async move {
                worker_loop(
                    &format!("processor-{worker_id}"),
                    pool,
                    &[JobKind::ProcessMeeting, JobKind::ProcessItem],
                    rx,
                    max_attempts,
                    |job| {
                        let processor = processor.clone();
                        async move {
                            match job.kind()? {
                                JobKind::ProcessMeeting => {
                                    processor.process_meeting(&job.payload).await
                                }
                                JobKind::ProcessItem => processor.process_item(&job.payload).await,
                                JobKind::SyncCity => Err(JobError::Other(
                                    "sync job routed to processor pool".into(),
                                )),
                            }
                        }
                    },
                )
                .await;
            }));
        }

        // Scheduler: enqueue sync jobs for stale cities.
        {
            let pool = self.pool.clone();
            let sync_interval = self.config.sync_interval;
            let mut rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                // Check hourly; the per-city freshness threshold does the
                // real gating. Floor at one minute: interval(0) panics.
                let period = Duration::from_secs(3600)
                    .min(sync_interval)
                    .max(Duration::from_secs(60));
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = schedule_stale_cities(&pool, sync_interval).await {
                                error!(error = %e, "scheduling pass failed");
                            }
                        }
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        // Sweeper: reclaim jobs whose worker died mid-flight.
        {
            let pool = self.pool.clone();
            let lease = self.config.job_lease;
            let sweep_interval = self.config.retry_sweep_interval;
            let max_attempts = self.config.job_max_attempts;
            let mut rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(sweep_interval.max(Duration::from_secs(60)));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            match sweep_stuck(&pool, lease, max_attempts).await {
                                Ok(0) => {}
                                Ok(n) => warn!(count = n, "reset stuck jobs"),
                                Err(e) => error!(error = %e, "stuck-job sweep failed"),
                            }
                        }
                        _ = rx.changed() => break,
                    }
                }
            }));
        }

        info!(
            fetchers = self.config.fetcher_workers,
            processors = self.config.processor_workers,
            "conductor running"
        );

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| JobError::Other(format!("signal handler failed: {e}")))?;
        info!("shutdown requested, draining workers");
        let _ = shutdown_tx.send(true);

        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(DRAIN_WINDOW, drain).await.is_err() {
            warn!("drain window elapsed with workers still busy; the sweeper will reclaim their jobs");
        }
        info!("conductor stopped");
        Ok(())
    }

    /// Point-in-time operational snapshot.
    pub async fn stats(pool: &PgPool) -> Result<QueueStats, DatabaseError> {
        let mut conn = pool.acquire().await?;
        QueueRepo::get_stats(&mut conn).await
    }
}

/// One scheduling pass: every active city whose last successful sync is
/// older than the freshness threshold gets a sync job.
#[instrument(skip(pool))]
async fn schedule_stale_cities(
    pool: &PgPool,
    sync_interval: Duration,
) -> Result<usize, DatabaseError> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(sync_interval)
            .unwrap_or_else(|_| chrono::Duration::hours(24));

    let cities = {
        let mut conn = pool.acquire().await?;
        CityRepo::cities_needing_sync(&mut conn, cutoff).await?
    };

    let mut enqueued = 0;
    for city in &cities {
        let banana = city.banana.clone();
        let inserted = transaction(pool, |conn| {
            use futures::FutureExt;
            let banana = banana.clone();
            async move {
                QueueRepo::enqueue(conn, JobKind::SyncCity, banana.as_str(), SYNC_PRIORITY).await
            }
            .boxed()
        })
        .await?;
        if inserted.is_some() {
            enqueued += 1;
        }
    }
    if enqueued > 0 {
        info!(cities = cities.len(), enqueued, "scheduled city syncs");
    }
    Ok(enqueued)
}

async fn sweep_stuck(
    pool: &PgPool,
    lease: Duration,
    max_attempts: i32,
) -> Result<u64, DatabaseError> {
    let mut conn = pool.acquire().await?;
    QueueRepo::reset_stuck(&mut conn, lease, max_attempts).await
}

/// Long-lived worker loop: claim, run, record the outcome, repeat.
/// Shutdown is checked between jobs; the current job always finishes.
async fn worker_loop<H, Fut>(
    name: &str,
    pool: PgPool,
    kinds: &[JobKind],
    shutdown: watch::Receiver<bool>,
    max_attempts: i32,
    handler: H,
) where
    H: Fn(ClaimedJob) -> Fut,
    Fut: std::future::Future<Output = Result<(), JobError>>,
{
    info!(worker = name, "worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let claimed = {
            match pool.acquire().await {
                Ok(mut conn) => QueueRepo::get_next_job(&mut conn, kinds).await,
                Err(e) => Err(DatabaseError::from(e)),
            }
        };

        let job = match claimed {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Queue empty: idle until the next poll or shutdown.
                let mut rx = shutdown.clone();
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = rx.changed() => {}
                }
                continue;
            }
            Err(e) => {
                error!(worker = name, error = %e, "claim failed");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        let job_id = job.id;
        let kind = job.kind.clone();
        let payload = job.payload.clone();
        match handler(job).await {
            Ok(()) => {
                if let Err(e) = finish(&pool, job_id, None, max_attempts).await {
                    error!(worker = name, job = job_id, error = %e, "failed to mark job complete");
                }
            }
            Err(e) => {
                warn!(worker = name, job = job_id, kind = %kind, payload = %payload, error = %e, "job failed");
                if let Err(mark) = finish(&pool, job_id, Some(e.to_string()), max_attempts).await {
                    error!(worker = name, job = job_id, error = %mark, "failed to record job failure");
                }
            }
        }
    }
    info!(worker = name, "worker stopped");
}

async fn finish(
    pool: &PgPool,
    job_id: i64,
    error: Option<String>,
    max_attempts: i32,
) -> Result<(), DatabaseError> {
    let mut conn = pool.acquire().await?;
    match error {
        None => QueueRepo::mark_complete(&mut conn, job_id).await,
        Some(message) => {
            QueueRepo::mark_failed(&mut conn, job_id, &message, max_attempts).await?;
            Ok(())
        }
    }
}
