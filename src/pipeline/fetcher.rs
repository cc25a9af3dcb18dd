// Sync job driver: load the city, run its vendor adapter over the
// configured window, upsert meetings and items, and enqueue processing
// work for anything new or changed. Unchanged meetings (matching
// vendor-side revision markers) are skipped wholesale.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::adapters::{self, AdapterClient};
use crate::config::Config;
use crate::errors::{JobError, ValidationError};
use crate::repository::cities::{CityLookup, CityRepo};
use crate::repository::items::{ItemRecord, ItemRepo};
use crate::repository::meetings::{MeetingRepo, StoreOutcome};
use crate::repository::queue::{meeting_priority, QueueRepo};
use crate::repository::transaction;
use crate::types::{Banana, CityStatus, FetchWindow, JobKind, RawAgendaItem, RawMeeting};

use super::rate_limit::VendorRateLimiter;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub fetched: usize,
    pub stored: usize,
    pub skipped_unchanged: usize,
    pub enqueued: usize,
}

pub struct Fetcher {
    pool: PgPool,
    config: Config,
    rate_limiter: Arc<VendorRateLimiter>,
}

impl Fetcher {
    pub fn new(pool: PgPool, config: Config, rate_limiter: Arc<VendorRateLimiter>) -> Self {
        Self {
            pool,
            config,
            rate_limiter,
        }
    }

    /// Drive one `sync_city` job to completion.
    #[instrument(skip(self), fields(banana = %banana))]
    pub async fn sync_city(&self, banana: &Banana) -> Result<SyncStats, JobError> {
        let city = {
            let mut conn = self.pool.acquire().await.map_err(crate::errors::DatabaseError::from)?;
            CityRepo::get_city(&mut conn, CityLookup::Banana(banana)).await?
        }
        .ok_or_else(|| {
            JobError::Validation(ValidationError::InvalidBanana(format!(
                "unknown city {banana}"
            )))
        })?;

        if city.status == CityStatus::Inactive {
            info!("city is inactive, nothing to sync");
            return Ok(SyncStats::default());
        }

        let client = AdapterClient::new(self.config.http_timeout)
            .map_err(JobError::Vendor)?
            .with_throttle(self.rate_limiter.clone(), city.vendor);
        let adapter = adapters::for_vendor(city.vendor, &city.slug, client);
        let window = FetchWindow {
            days_back: self.config.sync_days_back,
            days_forward: self.config.sync_days_forward,
        };

        let raw_meetings = adapter.fetch_meetings(window).await.map_err(JobError::Vendor)?;

        let mut stats = SyncStats {
            fetched: raw_meetings.len(),
            ..SyncStats::default()
        };

        for raw in &raw_meetings {
            if !raw.is_complete() {
                warn!(
                    vendor_id = %raw.vendor_meeting_id,
                    title = %raw.title,
                    "skipping incomplete meeting record"
                );
                continue;
            }
            let meeting_id = derive_meeting_id(banana, &raw.vendor_meeting_id);

            // Change detection: identical vendor revision marker means the
            // stored copy is current.
            if let Some(theirs) = raw.fingerprint.as_deref() {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(crate::errors::DatabaseError::from)?;
                if let Some(Some(ours)) = MeetingRepo::get_fingerprint(&mut conn, &meeting_id).await? {
                    if ours == theirs {
                        stats.skipped_unchanged += 1;
                        continue;
                    }
                }
            }

            let enqueued = self.store_one(banana, &meeting_id, raw).await?;
            stats.stored += 1;
            if enqueued {
                stats.enqueued += 1;
            }
        }

        {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(crate::errors::DatabaseError::from)?;
            CityRepo::mark_synced(&mut conn, banana, Utc::now()).await?;
        }

        info!(
            fetched = stats.fetched,
            stored = stats.stored,
            skipped = stats.skipped_unchanged,
            enqueued = stats.enqueued,
            "city sync finished"
        );
        Ok(stats)
    }

    /// Upsert one meeting with its items and queue follow-up processing,
    /// atomically.
    async fn store_one(
        &self,
        banana: &Banana,
        meeting_id: &str,
        raw: &RawMeeting,
    ) -> Result<bool, JobError> {
        let priority = meeting_priority(raw.date, Utc::now());
        let item_records = build_item_records(meeting_id, &raw.items);

        let enqueued = transaction(&self.pool, |conn| {
            let item_records = item_records.clone();
            let banana = banana.clone();
            let meeting_id = meeting_id.to_string();
            let raw = raw.clone();
            async move {
                let outcome =
                    MeetingRepo::store_meeting(conn, &meeting_id, &banana, &raw).await?;
                if outcome == StoreOutcome::Inserted {
                    tracing::debug!(meeting = %meeting_id, "new meeting stored");
                }
                if !item_records.is_empty() {
                    ItemRepo::store_agenda_items(conn, &meeting_id, &item_records).await?;
                }
                // Re-fetched meetings that changed get re-processed; the
                // unique pending constraint absorbs duplicates.
                let job =
                    QueueRepo::enqueue(conn, JobKind::ProcessMeeting, &meeting_id, priority)
                        .await?;
                Ok(job.is_some())
            }
            .boxed()
        })
        .await?;

        Ok(enqueued)
    }
}

/// Meeting ids are scoped by city so two vendors can reuse numeric ids.
pub fn derive_meeting_id(banana: &Banana, vendor_meeting_id: &str) -> String {
    format!("{banana}_{vendor_meeting_id}")
}

/// Item row ids are scoped by meeting and position, keeping re-syncs of
/// the same agenda idempotent.
pub fn build_item_records(meeting_id: &str, items: &[RawAgendaItem]) -> Vec<ItemRecord> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| ItemRecord {
            id: format!("{meeting_id}:{:04}", item.sequence.max(index as u32)),
            title: item.title.clone(),
            sequence: item.sequence,
            attachments: item.attachments.clone(),
            sponsors: item.sponsors.clone(),
            matter_file: item.matter_file.clone(),
            matter_id: item.matter_id.clone(),
            vote: item.vote.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn meeting_ids_are_city_scoped() {
        let nashville = Banana::parse("nashvilleTN").unwrap();
        let memphis = Banana::parse("memphisTN").unwrap();
        assert_eq!(derive_meeting_id(&nashville, "991"), "nashvilleTN_991");
        assert_ne!(
            derive_meeting_id(&nashville, "991"),
            derive_meeting_id(&memphis, "991")
        );
    }

    #[test]
    fn item_ids_are_stable_across_resyncs() {
        let items = vec![
            RawAgendaItem {
                title: "First item".into(),
                sequence: 1,
                matter_file: None,
                matter_id: None,
                attachments: vec![],
                sponsors: vec![],
                vote: None,
            },
            RawAgendaItem {
                title: "Second item".into(),
                sequence: 2,
                matter_file: Some("BL2025-1".into()),
                matter_id: Some("8d3f-uuid".into()),
                attachments: vec![],
                sponsors: vec![],
                vote: None,
            },
        ];
        let records = build_item_records("nashvilleTN_991", &items);
        assert_eq!(records[0].id, "nashvilleTN_991:0001");
        assert_eq!(records[1].id, "nashvilleTN_991:0002");
        assert_eq!(records[1].matter_file.as_deref(), Some("BL2025-1"));
        assert_eq!(records[1].matter_id.as_deref(), Some("8d3f-uuid"));
    }
}
