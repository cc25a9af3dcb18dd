// Agenda item store. Item ids are derived by the fetcher
// (`{meeting_id}:{sequence-or-vendor-ref}`) so upserts stay idempotent
// across re-syncs of the same agenda.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::PgConnection;
use tracing::instrument;

use crate::errors::DatabaseError;
use crate::types::{AgendaItem, Attachment, RawVote, Sponsor};

/// Input row for `store_agenda_items`. `matter_id` is the vendor's raw
/// identifier (the Tier-2 fallback input), not the composite matter link
/// the tracker assigns later.
#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub id: String,
    pub title: String,
    pub sequence: u32,
    pub attachments: Vec<Attachment>,
    pub sponsors: Vec<Sponsor>,
    pub matter_file: Option<String>,
    pub matter_id: Option<String>,
    pub vote: Option<RawVote>,
}

#[derive(Debug, Clone)]
pub struct ItemSummaryUpdate {
    pub item_id: String,
    pub summary: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRow {
    id: String,
    meeting_id: String,
    title: String,
    sequence: i32,
    attachments: JsonValue,
    sponsors: JsonValue,
    matter_id: Option<String>,
    matter_file: Option<String>,
    vendor_matter_id: Option<String>,
    summary: Option<String>,
    vote: Option<JsonValue>,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

const ITEM_COLUMNS: &str = "id, meeting_id, title, sequence, attachments, sponsors, matter_id, \
     matter_file, vendor_matter_id, summary, vote, created_at";

pub struct ItemRepo;

impl ItemRepo {
    /// Bulk idempotent upsert of a meeting's items. Matter linkage is left
    /// alone here; the matter tracker owns that column.
    #[instrument(skip(conn, records), fields(meeting = %meeting_id, count = records.len()))]
    pub async fn store_agenda_items(
        conn: &mut PgConnection,
        meeting_id: &str,
        records: &[ItemRecord],
    ) -> Result<(), DatabaseError> {
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO items (id, meeting_id, title, sequence, attachments, sponsors,
                                   matter_file, vendor_matter_id, vote)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id)
                DO UPDATE SET
                    title = EXCLUDED.title,
                    sequence = EXCLUDED.sequence,
                    attachments = EXCLUDED.attachments,
                    sponsors = EXCLUDED.sponsors,
                    matter_file = EXCLUDED.matter_file,
                    vendor_matter_id = COALESCE(EXCLUDED.vendor_matter_id, items.vendor_matter_id),
                    vote = COALESCE(EXCLUDED.vote, items.vote)
                "#,
            )
            .bind(&record.id)
            .bind(meeting_id)
            .bind(&record.title)
            .bind(record.sequence as i32)
            .bind(Json(&record.attachments))
            .bind(Json(&record.sponsors))
            .bind(&record.matter_file)
            .bind(&record.matter_id)
            .bind(record.vote.as_ref().map(Json))
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    #[instrument(skip(conn))]
    pub async fn get_agenda_items(
        conn: &mut PgConnection,
        meeting_id: &str,
    ) -> Result<Vec<AgendaItem>, DatabaseError> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE meeting_id = $1
            ORDER BY sequence ASC, created_at ASC
            "#
        ))
        .bind(meeting_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(Self::hydrate(conn, row).await?);
        }
        Ok(items)
    }

    #[instrument(skip(conn))]
    pub async fn get_item(
        conn: &mut PgConnection,
        item_id: &str,
    ) -> Result<Option<AgendaItem>, DatabaseError> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
                .bind(item_id)
                .fetch_optional(&mut *conn)
                .await?;
        match row {
            Some(row) => Ok(Some(Self::hydrate(conn, row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(conn, update))]
    pub async fn update_item_summary(
        conn: &mut PgConnection,
        update: &ItemSummaryUpdate,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE items SET summary = $2 WHERE id = $1")
            .bind(&update.item_id)
            .bind(&update.summary)
            .execute(&mut *conn)
            .await?;
        Self::replace_topics(conn, &update.item_id, &update.topics).await
    }

    /// All of a meeting's item summaries in one tight sequence; callers
    /// wrap this in a transaction so readers see the agenda atomically.
    #[instrument(skip(conn, updates), fields(count = updates.len()))]
    pub async fn bulk_update_item_summaries(
        conn: &mut PgConnection,
        updates: &[ItemSummaryUpdate],
    ) -> Result<(), DatabaseError> {
        for update in updates {
            Self::update_item_summary(conn, update).await?;
        }
        Ok(())
    }

    /// Link an item to its matter row.
    #[instrument(skip(conn))]
    pub async fn set_item_matter(
        conn: &mut PgConnection,
        item_id: &str,
        matter_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE items SET matter_id = $2 WHERE id = $1")
            .bind(item_id)
            .bind(matter_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Adopt a matter's canonical summary and topics onto an item, in SQL,
    /// so the copy and the matter row always agree within the transaction.
    #[instrument(skip(conn))]
    pub async fn apply_canonical_summary(
        conn: &mut PgConnection,
        item_id: &str,
        matter_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE items
            SET summary = (SELECT canonical_summary FROM city_matters WHERE id = $2),
                matter_id = $2
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .bind(matter_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM item_topics WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO item_topics (item_id, topic)
            SELECT $1, topic FROM matter_topics WHERE matter_id = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(item_id)
        .bind(matter_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Per-item topic lists for a whole meeting, for meeting-level
    /// aggregation. Items without topics contribute an empty list.
    #[instrument(skip(conn))]
    pub async fn topic_lists(
        conn: &mut PgConnection,
        meeting_id: &str,
    ) -> Result<Vec<Vec<String>>, DatabaseError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT i.id, t.topic
            FROM items i
            LEFT JOIN item_topics t ON t.item_id = i.id
            WHERE i.meeting_id = $1
            ORDER BY i.sequence ASC, i.id ASC
            "#,
        )
        .bind(meeting_id)
        .fetch_all(conn)
        .await?;

        let mut lists: Vec<Vec<String>> = Vec::new();
        let mut current: Option<String> = None;
        for (item_id, topic) in rows {
            if current.as_deref() != Some(item_id.as_str()) {
                current = Some(item_id);
                lists.push(Vec::new());
            }
            if let (Some(last), Some(topic)) = (lists.last_mut(), topic) {
                last.push(topic);
            }
        }
        Ok(lists)
    }

    #[instrument(skip(conn, topics))]
    pub async fn replace_topics(
        conn: &mut PgConnection,
        item_id: &str,
        topics: &[String],
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM item_topics WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        for topic in topics {
            sqlx::query(
                "INSERT INTO item_topics (item_id, topic) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(item_id)
            .bind(topic)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn hydrate(conn: &mut PgConnection, row: ItemRow) -> Result<AgendaItem, DatabaseError> {
        let topics: Vec<String> =
            sqlx::query_scalar("SELECT topic FROM item_topics WHERE item_id = $1 ORDER BY topic")
                .bind(&row.id)
                .fetch_all(conn)
                .await?;

        let attachments: Vec<Attachment> = serde_json::from_value(row.attachments)
            .map_err(|e| DatabaseError::Integrity(format!("bad attachments json: {e}")))?;
        let sponsors: Vec<Sponsor> = serde_json::from_value(row.sponsors)
            .map_err(|e| DatabaseError::Integrity(format!("bad sponsors json: {e}")))?;
        let vote: Option<RawVote> = row
            .vote
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DatabaseError::Integrity(format!("bad vote json: {e}")))?;

        Ok(AgendaItem {
            id: row.id,
            meeting_id: row.meeting_id,
            title: row.title,
            sequence: row.sequence.max(0) as u32,
            attachments,
            sponsors,
            matter_id: row.matter_id,
            matter_file: row.matter_file,
            vendor_matter_id: row.vendor_matter_id,
            summary: row.summary,
            topics,
            vote,
        })
    }
}
