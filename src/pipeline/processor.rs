// Processing job driver: extractor -> summariser -> normaliser ->
// repositories. Item-based when the agenda has items, monolithic over the
// packet otherwise. Extraction and LLM failures degrade to null summaries
// and the meeting still completes; database failures abort the job so the
// queue retries it.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::adapters::AdapterClient;
use crate::config::Config;
use crate::errors::{DatabaseError, JobError};
use crate::extractor::TextExtractor;
use crate::matter_tracker::{MatterTracker, TrackDecision, TrackedItem};
use crate::repository::cache::CacheRepo;
use crate::repository::items::{ItemRepo, ItemSummaryUpdate};
use crate::repository::meetings::MeetingRepo;
use crate::repository::transaction;
use crate::summarizer::{Summarizer, SummaryRequest};
use crate::topics::taxonomy;
use crate::types::{AgendaItem, Meeting, ProcessingMethod, ProcessingStatus, TextQuality};

/// Batch the whole agenda in one call only when it stays comfortably
/// inside the small model's input budget.
const BATCH_MAX_TOTAL_CHARS: usize = 150_000;

pub struct Processor {
    pool: PgPool,
    extractor: TextExtractor,
    summarizer: Arc<dyn Summarizer>,
}

/// One item's journey through the pipeline.
#[derive(Clone)]
struct ItemWork {
    item: AgendaItem,
    decision: TrackDecision,
    text: Option<String>,
    content_hash: Option<String>,
    summary: Option<String>,
    topics: Vec<String>,
    from_cache: bool,
}

impl Processor {
    pub fn new(
        pool: PgPool,
        config: &Config,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, JobError> {
        let client = AdapterClient::new(config.http_timeout).map_err(JobError::Vendor)?;
        Ok(Self {
            pool,
            extractor: TextExtractor::new(client),
            summarizer,
        })
    }

    /// Drive one `process_meeting` job.
    #[instrument(skip(self), fields(meeting = %meeting_id))]
    pub async fn process_meeting(&self, meeting_id: &str) -> Result<(), JobError> {
        let started = Instant::now();

        let (meeting, items) = {
            let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
            let Some(meeting) = MeetingRepo::get_meeting(&mut conn, meeting_id).await? else {
                warn!("meeting vanished before processing, completing job");
                return Ok(());
            };
            let items = ItemRepo::get_agenda_items(&mut conn, meeting_id).await?;
            MeetingRepo::update_meeting_status(&mut conn, meeting_id, ProcessingStatus::Processing)
                .await?;
            (meeting, items)
        };

        let outcome = if items.is_empty() {
            self.process_monolithic(&meeting, started).await
        } else {
            self.process_item_based(&meeting, items, started).await
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(e) => {
                // Leave a failed marker for the API before the queue retry.
                let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
                MeetingRepo::update_meeting_status(&mut conn, meeting_id, ProcessingStatus::Failed)
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    /// Item-based path. Three phases: track matters (one transaction),
    /// extract + summarise (no transaction held across network calls),
    /// persist all item writes atomically.
    async fn process_item_based(
        &self,
        meeting: &Meeting,
        items: Vec<AgendaItem>,
        started: Instant,
    ) -> Result<(), JobError> {
        let meeting_id = meeting.id.clone();
        let now = Utc::now();

        // Phase 1: matter tracking. Unchanged known matters adopt their
        // canonical summary here and skip the LLM entirely.
        let decisions = transaction(&self.pool, |conn| {
            let items = items.clone();
            let banana = meeting.banana.clone();
            let meeting_id = meeting_id.clone();
            let meeting_date = meeting.date;
            async move {
                let mut decisions = Vec::with_capacity(items.len());
                for item in &items {
                    let tracked = TrackedItem {
                        item_id: &item.id,
                        title: &item.title,
                        matter_file: item.matter_file.as_deref(),
                        matter_id: item.vendor_matter_id.as_deref(),
                        attachments: &item.attachments,
                        vote: item.vote.as_ref(),
                    };
                    let decision = MatterTracker::track_item(
                        conn,
                        &banana,
                        &meeting_id,
                        meeting_date,
                        &tracked,
                        now,
                    )
                    .await?;
                    decisions.push(decision);
                }
                Ok(decisions)
            }
            .boxed()
        })
        .await?;

        let mut work: Vec<ItemWork> = items
            .into_iter()
            .zip(decisions)
            .map(|(item, decision)| ItemWork {
                item,
                decision,
                text: None,
                content_hash: None,
                summary: None,
                topics: Vec::new(),
                from_cache: false,
            })
            .collect();

        // Phase 2a: extraction and cache lookups.
        for entry in &mut work {
            if matches!(entry.decision, TrackDecision::ReuseCanonical { .. }) {
                continue;
            }
            let urls: Vec<String> = entry
                .item
                .attachments
                .iter()
                .map(|a| a.url.clone())
                .collect();
            if urls.is_empty() {
                continue;
            }
            match self.extractor.extract_concatenated(&urls).await {
                Ok(extracted) => {
                    if extracted.quality == TextQuality::Poor {
                        warn!(item = %entry.item.id, "extracted text is poor, summarising anyway");
                    }
                    entry.content_hash = Some(CacheRepo::content_hash(&extracted.text));
                    entry.text = Some(extracted.text);
                }
                Err(e) => {
                    warn!(item = %entry.item.id, error = %e, "extraction failed, item keeps a null summary");
                }
            }
        }

        {
            let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
            for entry in &mut work {
                let Some(hash) = entry.content_hash.as_deref() else {
                    continue;
                };
                if let Some(cached) = CacheRepo::lookup(&mut conn, hash).await? {
                    entry.summary = Some(cached.summary);
                    entry.topics = cached.topics;
                    entry.from_cache = true;
                }
            }
        }

        // Phase 2b: summarise what the cache did not cover.
        let pending: Vec<usize> = work
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.text.is_some() && !entry.from_cache)
            .map(|(index, _)| index)
            .collect();
        let method = self.summarize_pending(meeting, &mut work, &pending).await;

        // Phase 3: all item writes in one transaction, so readers see the
        // agenda's summaries atomically. Canonical matter updates ride in
        // the same transaction as the items that adopt them.
        let updates: Vec<ItemSummaryUpdate> = work
            .iter()
            .filter(|entry| entry.summary.is_some() && !matches!(entry.decision, TrackDecision::ReuseCanonical { .. }))
            .map(|entry| ItemSummaryUpdate {
                item_id: entry.item.id.clone(),
                summary: entry.summary.clone().unwrap_or_default(),
                topics: entry.topics.clone(),
            })
            .collect();
        let elapsed_ms = started.elapsed().as_millis() as i64;

        transaction(&self.pool, |conn| {
            let updates = updates.clone();
            let meeting_id = meeting_id.clone();
            let work = work.clone();
            async move {
                ItemRepo::bulk_update_item_summaries(conn, &updates).await?;

                for entry in work.iter() {
                    let (Some(summary), Some(matter_id)) =
                        (entry.summary.as_deref(), entry.decision.matter_id())
                    else {
                        continue;
                    };
                    // Cache hits still refresh the canonical copy; the
                    // summary is just as authoritative however it was paid
                    // for.
                    if matches!(
                        entry.decision,
                        TrackDecision::SummarizeNew { .. } | TrackDecision::Reprocess { .. }
                    ) {
                        MatterTracker::record_canonical(
                            conn,
                            matter_id,
                            summary,
                            &entry.topics,
                            &entry.item.attachments,
                        )
                        .await?;
                    }
                    if let Some(hash) = entry.content_hash.as_deref() {
                        if !entry.from_cache {
                            CacheRepo::store(conn, hash, summary, &entry.topics, method, None)
                                .await?;
                        }
                    }
                }

                // Aggregate from the rows just written so reused canonical
                // topics count too.
                let per_item = ItemRepo::topic_lists(conn, &meeting_id).await?;
                let meeting_topics = taxonomy().aggregate(&per_item);
                MeetingRepo::replace_topics(conn, &meeting_id, &meeting_topics).await?;
                MeetingRepo::update_processing_meta(conn, &meeting_id, method, elapsed_ms).await?;
                MeetingRepo::update_meeting_status(conn, &meeting_id, ProcessingStatus::Completed)
                    .await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        info!(
            items = work.len(),
            summarised = updates.len(),
            method = method.as_str(),
            elapsed_ms,
            "meeting processed item-based"
        );
        Ok(())
    }

    /// Summarise the pending indexes, batching when everything fits in one
    /// call, and falling back to per-item calls when the batch misbehaves.
    /// Returns the processing method actually used.
    async fn summarize_pending(
        &self,
        meeting: &Meeting,
        work: &mut [ItemWork],
        pending: &[usize],
    ) -> ProcessingMethod {
        if pending.is_empty() {
            return ProcessingMethod::ItemBased;
        }

        let requests: Vec<SummaryRequest> = pending
            .iter()
            .map(|&index| {
                let entry = &work[index];
                SummaryRequest {
                    context: format!("{} — {}", meeting.title, entry.item.title),
                    text: entry.text.clone().unwrap_or_default(),
                }
            })
            .collect();

        let total_chars: usize = requests.iter().map(|r| r.text.len()).sum();
        let batchable = self.summarizer.supports_batch()
            && pending.len() > 1
            && total_chars <= BATCH_MAX_TOTAL_CHARS;

        if batchable {
            match self.summarizer.summarize_batch(&requests).await {
                Ok(results) => {
                    for (&index, result) in pending.iter().zip(results) {
                        work[index].summary = Some(result.summary);
                        work[index].topics = result.topics;
                    }
                    return ProcessingMethod::Batch;
                }
                Err(e) => {
                    warn!(error = %e, "batch summarisation failed, falling back to per-item calls");
                }
            }
        }

        for (&index, request) in pending.iter().zip(&requests) {
            match self.summarizer.summarize(request).await {
                Ok(result) => {
                    work[index].summary = Some(result.summary);
                    work[index].topics = result.topics;
                }
                Err(e) => {
                    warn!(item = %work[index].item.id, error = %e, "summarisation failed, item keeps a null summary");
                }
            }
        }
        ProcessingMethod::ItemBased
    }

    /// Monolithic fallback: one extraction over the packet, one summary on
    /// the meeting row.
    async fn process_monolithic(&self, meeting: &Meeting, started: Instant) -> Result<(), JobError> {
        let meeting_id = meeting.id.clone();
        let urls: Vec<String> = if meeting.packet_urls.is_empty() {
            meeting.agenda_url.iter().cloned().collect()
        } else {
            meeting.packet_urls.clone()
        };

        let extracted = match self.extractor.extract_concatenated(&urls).await {
            Ok(extracted) => extracted,
            Err(e) => {
                // Fail-fast policy: the meeting completes with no summary.
                warn!(error = %e, "packet extraction failed, meeting completes without a summary");
                let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
                MeetingRepo::update_meeting_status(
                    &mut conn,
                    &meeting_id,
                    ProcessingStatus::Completed,
                )
                .await?;
                return Ok(());
            }
        };

        let hash = CacheRepo::content_hash(&extracted.text);
        let cached = {
            let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
            CacheRepo::lookup(&mut conn, &hash).await?
        };
        let (summary, topics, from_cache) = match cached {
            Some(hit) => (hit.summary, hit.topics, true),
            None => {
                let request = SummaryRequest {
                    context: meeting.title.clone(),
                    text: extracted.text,
                };
                match self.summarizer.summarize(&request).await {
                    Ok(result) => (result.summary, result.topics, false),
                    Err(e) => {
                        warn!(error = %e, "summarisation failed, meeting completes without a summary");
                        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
                        MeetingRepo::update_meeting_status(
                            &mut conn,
                            &meeting_id,
                            ProcessingStatus::Completed,
                        )
                        .await?;
                        return Ok(());
                    }
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as i64;
        transaction(&self.pool, |conn| {
            let meeting_id = meeting_id.clone();
            let summary = summary.clone();
            let topics = topics.clone();
            let hash = hash.clone();
            async move {
                MeetingRepo::update_meeting_summary(
                    conn,
                    &meeting_id,
                    &summary,
                    &topics,
                    ProcessingMethod::Monolithic,
                    elapsed_ms,
                )
                .await?;
                MeetingRepo::update_meeting_status(conn, &meeting_id, ProcessingStatus::Completed)
                    .await?;
                if !from_cache {
                    CacheRepo::store(
                        conn,
                        &hash,
                        &summary,
                        &topics,
                        ProcessingMethod::Monolithic,
                        None,
                    )
                    .await?;
                }
                Ok(())
            }
            .boxed()
        })
        .await?;

        info!(elapsed_ms, from_cache, "meeting processed monolithically");
        Ok(())
    }

    /// Drive one `process_item` job: re-extract and re-summarise a single
    /// item, refreshing its matter's canonical copy.
    #[instrument(skip(self), fields(item = %item_id))]
    pub async fn process_item(&self, item_id: &str) -> Result<(), JobError> {
        let item = {
            let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
            ItemRepo::get_item(&mut conn, item_id).await?
        };
        let Some(item) = item else {
            warn!("item vanished before processing, completing job");
            return Ok(());
        };

        let urls: Vec<String> = item.attachments.iter().map(|a| a.url.clone()).collect();
        if urls.is_empty() {
            return Ok(());
        }
        let extracted = match self.extractor.extract_concatenated(&urls).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(error = %e, "extraction failed, item keeps its summary");
                return Ok(());
            }
        };

        let request = SummaryRequest {
            context: item.title.clone(),
            text: extracted.text,
        };
        let result = match self.summarizer.summarize(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "summarisation failed, item keeps its summary");
                return Ok(());
            }
        };

        transaction(&self.pool, |conn| {
            let update = ItemSummaryUpdate {
                item_id: item.id.clone(),
                summary: result.summary.clone(),
                topics: result.topics.clone(),
            };
            let item = item.clone();
            let result = result.clone();
            async move {
                ItemRepo::update_item_summary(conn, &update).await?;
                if let Some(matter_id) = item.matter_id.as_deref() {
                    MatterTracker::record_canonical(
                        conn,
                        matter_id,
                        &result.summary,
                        &result.topics,
                        &item.attachments,
                    )
                    .await?;
                }
                Ok(())
            }
            .boxed()
        })
        .await?;
        Ok(())
    }
}
