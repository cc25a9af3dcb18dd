// Matter tracking: decides whether an agenda item is a new legislative
// matter or another appearance of a known one, and whether its cached
// canonical summary may be reused. Runs inside the caller's transaction;
// every method here is repository calls plus pure decisions.

use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgConnection;
use tracing::{debug, instrument};

use crate::errors::DatabaseError;
use crate::matter_id::generate_matter_id;
use crate::repository::items::ItemRepo;
use crate::repository::matters::{MatterRepo, NewMatter};
use crate::types::{Attachment, Banana, RawVote};

/// What the processor should do with an item's summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackDecision {
    /// No identifying matter reference; the item is unique by definition.
    Untracked,
    /// First sighting: summarise and then store the canonical copy.
    SummarizeNew { matter_id: String },
    /// Known matter with unchanged attachments: canonical summary adopted,
    /// skip the LLM.
    ReuseCanonical { matter_id: String },
    /// Known matter but the attachments changed (or no canonical summary
    /// exists yet): summarise and refresh the canonical copy.
    Reprocess { matter_id: String },
}

impl TrackDecision {
    pub fn matter_id(&self) -> Option<&str> {
        match self {
            TrackDecision::Untracked => None,
            TrackDecision::SummarizeNew { matter_id }
            | TrackDecision::ReuseCanonical { matter_id }
            | TrackDecision::Reprocess { matter_id } => Some(matter_id),
        }
    }
}

/// The slice of an item the tracker needs.
#[derive(Debug, Clone)]
pub struct TrackedItem<'a> {
    pub item_id: &'a str,
    pub title: &'a str,
    pub matter_file: Option<&'a str>,
    pub matter_id: Option<&'a str>,
    pub attachments: &'a [Attachment],
    pub vote: Option<&'a RawVote>,
}

pub struct MatterTracker;

impl MatterTracker {
    /// SHA-256 over the sorted attachment URL list. Sorting makes the hash
    /// insensitive to vendor reordering; content changes surface as new
    /// URLs on every platform we ingest.
    pub fn attachment_fingerprint(attachments: &[Attachment]) -> Option<String> {
        if attachments.is_empty() {
            return None;
        }
        let mut urls: Vec<&str> = attachments.iter().map(|a| a.url.as_str()).collect();
        urls.sort_unstable();
        let mut hasher = Sha256::new();
        for url in urls {
            hasher.update(url.as_bytes());
            hasher.update(b"\n");
        }
        Some(hex::encode(hasher.finalize()))
    }

    /// Track one item against the matter store and link the item row.
    #[instrument(skip(conn, item), fields(item = %item.item_id))]
    pub async fn track_item(
        conn: &mut PgConnection,
        banana: &Banana,
        meeting_id: &str,
        meeting_date: Option<NaiveDateTime>,
        item: &TrackedItem<'_>,
        now: DateTime<Utc>,
    ) -> Result<TrackDecision, DatabaseError> {
        let Some(matter_id) =
            generate_matter_id(banana, item.matter_file, item.matter_id, Some(item.title))
        else {
            return Ok(TrackDecision::Untracked);
        };

        let attachment_hash = Self::attachment_fingerprint(item.attachments);
        let existing = MatterRepo::get_matter(conn, &matter_id).await?;

        let decision = match existing {
            None => {
                MatterRepo::store_matter(
                    conn,
                    &NewMatter {
                        id: &matter_id,
                        banana,
                        matter_file: item.matter_file,
                        matter_id: item.matter_id,
                        title: item.title,
                        attachment_hash: attachment_hash.as_deref(),
                        seen_at: now,
                    },
                )
                .await?;
                MatterRepo::create_appearance(
                    conn,
                    &matter_id,
                    meeting_id,
                    meeting_date,
                    1,
                    item.vote.map(|v| v.outcome),
                    item.vote.and_then(|v| v.tally.as_ref()),
                )
                .await?;
                TrackDecision::SummarizeNew {
                    matter_id: matter_id.clone(),
                }
            }
            Some(matter) => {
                let inserted = MatterRepo::create_appearance(
                    conn,
                    &matter_id,
                    meeting_id,
                    meeting_date,
                    matter.appearance_count + 1,
                    item.vote.map(|v| v.outcome),
                    item.vote.and_then(|v| v.tally.as_ref()),
                )
                .await?;
                if inserted {
                    MatterRepo::update_matter_tracking(conn, &matter_id, now).await?;
                }

                let unchanged = attachment_hash.is_some()
                    && attachment_hash.as_deref() == matter.attachment_hash.as_deref();
                if unchanged && matter.canonical_summary.is_some() {
                    ItemRepo::apply_canonical_summary(conn, item.item_id, &matter_id).await?;
                    debug!(matter = %matter_id, "canonical summary reused");
                    TrackDecision::ReuseCanonical {
                        matter_id: matter_id.clone(),
                    }
                } else {
                    TrackDecision::Reprocess {
                        matter_id: matter_id.clone(),
                    }
                }
            }
        };

        if !matches!(decision, TrackDecision::ReuseCanonical { .. }) {
            // ReuseCanonical already linked the item in SQL.
            ItemRepo::set_item_matter(conn, item.item_id, &matter_id).await?;
        }

        // A terminal vote closes the matter out.
        if let Some(vote) = item.vote {
            let disposition = vote.outcome.to_disposition();
            MatterRepo::set_disposition(
                conn,
                &matter_id,
                disposition,
                meeting_date.map(|d| d.date()),
            )
            .await?;
        }

        Ok(decision)
    }

    /// After a summarisation pass, refresh the matter's canonical copy so
    /// later unchanged appearances can adopt it.
    #[instrument(skip(conn, summary, topics))]
    pub async fn record_canonical(
        conn: &mut PgConnection,
        matter_id: &str,
        summary: &str,
        topics: &[String],
        attachments: &[Attachment],
    ) -> Result<(), DatabaseError> {
        let hash = Self::attachment_fingerprint(attachments);
        MatterRepo::update_canonical(conn, matter_id, summary, topics, hash.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attachment(url: &str) -> Attachment {
        Attachment::pdf("Exhibit", url)
    }

    #[test]
    fn fingerprint_ignores_attachment_order() {
        let forward = vec![attachment("https://a/1.pdf"), attachment("https://a/2.pdf")];
        let backward = vec![attachment("https://a/2.pdf"), attachment("https://a/1.pdf")];
        assert_eq!(
            MatterTracker::attachment_fingerprint(&forward),
            MatterTracker::attachment_fingerprint(&backward)
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let original = vec![attachment("https://a/1.pdf")];
        let revised = vec![attachment("https://a/1-rev2.pdf")];
        assert_ne!(
            MatterTracker::attachment_fingerprint(&original),
            MatterTracker::attachment_fingerprint(&revised)
        );
        assert_eq!(MatterTracker::attachment_fingerprint(&[]), None);
    }
}
