// Meeting store. Writes are idempotent upserts keyed by the derived
// meeting id; topic rows are replaced wholesale whenever a summary lands.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::PgConnection;
use tracing::instrument;

use crate::errors::DatabaseError;
use crate::types::{
    AgendaItem, Banana, Meeting, MeetingPayload, MeetingStatus, Participation, ProcessingMethod,
    ProcessingStatus, RawMeeting,
};

use super::items::ItemRepo;

#[derive(Debug, Clone, sqlx::FromRow)]
struct MeetingRow {
    id: String,
    banana: String,
    title: String,
    date: Option<NaiveDateTime>,
    agenda_url: Option<String>,
    packet_url: JsonValue,
    summary: Option<String>,
    participation: Option<JsonValue>,
    status: String,
    processing_status: String,
    processing_method: Option<String>,
    processing_time_ms: Option<i64>,
    vendor_fingerprint: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const MEETING_COLUMNS: &str = "id, banana, title, date, agenda_url, packet_url, summary, \
     participation, status, processing_status, processing_method, processing_time_ms, \
     vendor_fingerprint, created_at, updated_at";

/// What `store_meeting` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    Updated,
}

pub struct MeetingRepo;

impl MeetingRepo {
    /// Idempotent upsert by id. Summary and processing state are never
    /// touched here; a re-fetched meeting keeps its processed results.
    #[instrument(skip(conn, raw), fields(meeting = %id))]
    pub async fn store_meeting(
        conn: &mut PgConnection,
        id: &str,
        banana: &Banana,
        raw: &RawMeeting,
    ) -> Result<StoreOutcome, DatabaseError> {
        let participation = if raw.participation.is_empty() {
            None
        } else {
            Some(Json(&raw.participation))
        };

        // xmax = 0 only holds for freshly inserted tuples.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO meetings (
                id, banana, title, date, agenda_url, packet_url,
                participation, status, vendor_fingerprint
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id)
            DO UPDATE SET
                title = EXCLUDED.title,
                date = EXCLUDED.date,
                agenda_url = EXCLUDED.agenda_url,
                packet_url = EXCLUDED.packet_url,
                participation = COALESCE(EXCLUDED.participation, meetings.participation),
                status = EXCLUDED.status,
                vendor_fingerprint = EXCLUDED.vendor_fingerprint,
                updated_at = NOW()
            RETURNING (xmax = 0)
            "#,
        )
        .bind(id)
        .bind(banana.as_str())
        .bind(&raw.title)
        .bind(raw.date)
        .bind(&raw.agenda_url)
        .bind(Json(&raw.packet_urls))
        .bind(participation)
        .bind(raw.status.as_str())
        .bind(&raw.fingerprint)
        .fetch_one(conn)
        .await?;

        Ok(if inserted {
            StoreOutcome::Inserted
        } else {
            StoreOutcome::Updated
        })
    }

    /// The stored vendor-side revision marker, for change detection.
    /// `None` = meeting unknown; `Some(None)` = known, no marker.
    #[instrument(skip(conn))]
    pub async fn get_fingerprint(
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<Option<Option<String>>, DatabaseError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT vendor_fingerprint FROM meetings WHERE id = $1")
                .bind(id)
                .fetch_optional(conn)
                .await?;
        Ok(row.map(|(fingerprint,)| fingerprint))
    }

    #[instrument(skip(conn))]
    pub async fn get_meeting(
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<Option<Meeting>, DatabaseError> {
        let row: Option<MeetingRow> = sqlx::query_as(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::hydrate(conn, row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(conn))]
    pub async fn get_meetings_for_city(
        conn: &mut PgConnection,
        banana: &Banana,
        since: Option<NaiveDateTime>,
        limit: Option<i64>,
    ) -> Result<Vec<Meeting>, DatabaseError> {
        let rows: Vec<MeetingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MEETING_COLUMNS} FROM meetings
            WHERE banana = $1
              AND ($2::timestamp IS NULL OR date >= $2)
            ORDER BY date DESC NULLS LAST
            LIMIT $3
            "#
        ))
        .bind(banana.as_str())
        .bind(since)
        .bind(limit.unwrap_or(100))
        .fetch_all(&mut *conn)
        .await?;

        let mut meetings = Vec::with_capacity(rows.len());
        for row in rows {
            meetings.push(Self::hydrate(conn, row).await?);
        }
        Ok(meetings)
    }

    /// Store the summary plus topics and stamp the processing metadata, in
    /// one tight sequence.
    #[instrument(skip(conn, summary, topics))]
    pub async fn update_meeting_summary(
        conn: &mut PgConnection,
        id: &str,
        summary: &str,
        topics: &[String],
        method: ProcessingMethod,
        processing_time_ms: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE meetings
            SET summary = $2,
                processing_method = $3,
                processing_time_ms = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(summary)
        .bind(method.as_str())
        .bind(processing_time_ms)
        .execute(&mut *conn)
        .await?;

        Self::replace_topics(conn, id, topics).await
    }

    /// Stamp processing metadata for the item-based path, where the
    /// meeting-level summary stays empty and only items carry text.
    #[instrument(skip(conn))]
    pub async fn update_processing_meta(
        conn: &mut PgConnection,
        id: &str,
        method: ProcessingMethod,
        processing_time_ms: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE meetings
            SET processing_method = $2,
                processing_time_ms = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(method.as_str())
        .bind(processing_time_ms)
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument(skip(conn, topics))]
    pub async fn replace_topics(
        conn: &mut PgConnection,
        id: &str,
        topics: &[String],
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM meeting_topics WHERE meeting_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        for topic in topics {
            sqlx::query(
                "INSERT INTO meeting_topics (meeting_id, topic) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(topic)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    #[instrument(skip(conn))]
    pub async fn update_meeting_status(
        conn: &mut PgConnection,
        id: &str,
        status: ProcessingStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE meetings SET processing_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// The contractually fixed JSON shape for the API layer. `has_items`
    /// is derived from item rows at read time.
    #[instrument(skip(conn))]
    pub async fn meeting_payload(
        conn: &mut PgConnection,
        id: &str,
        include_items: bool,
    ) -> Result<Option<MeetingPayload>, DatabaseError> {
        let Some(meeting) = Self::get_meeting(conn, id).await? else {
            return Ok(None);
        };
        let has_items: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM items WHERE meeting_id = $1)")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;
        let items: Option<Vec<AgendaItem>> = if include_items && has_items {
            Some(ItemRepo::get_agenda_items(conn, id).await?)
        } else {
            None
        };

        Ok(Some(MeetingPayload {
            id: meeting.id,
            banana: meeting.banana.to_string(),
            title: meeting.title,
            date: meeting.date,
            agenda_url: meeting.agenda_url,
            packet_url: meeting.packet_urls,
            summary: meeting.summary,
            participation: meeting.participation,
            topics: meeting.topics,
            has_items,
            items,
            processing_status: meeting.processing_status,
        }))
    }

    /// Delete a meeting together with any still-pending queue work scoped
    /// to it. Items and topic rows go via cascade.
    #[instrument(skip(conn))]
    pub async fn delete_meeting(conn: &mut PgConnection, id: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "DELETE FROM queue_jobs WHERE payload = $1 AND kind LIKE 'process_%' AND status = 'pending'",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;
        sqlx::query("DELETE FROM meetings WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn hydrate(conn: &mut PgConnection, row: MeetingRow) -> Result<Meeting, DatabaseError> {
        let topics: Vec<String> =
            sqlx::query_scalar("SELECT topic FROM meeting_topics WHERE meeting_id = $1 ORDER BY topic")
                .bind(&row.id)
                .fetch_all(conn)
                .await?;

        let packet_urls: Vec<String> = serde_json::from_value(row.packet_url)
            .map_err(|e| DatabaseError::Integrity(format!("bad packet_url json: {e}")))?;
        let participation: Option<Participation> = row
            .participation
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DatabaseError::Integrity(format!("bad participation json: {e}")))?;

        Ok(Meeting {
            banana: Banana::parse(&row.banana)
                .map_err(|e| DatabaseError::Integrity(e.to_string()))?,
            id: row.id,
            title: row.title,
            date: row.date,
            agenda_url: row.agenda_url,
            packet_urls,
            summary: row.summary,
            participation,
            status: row
                .status
                .parse::<MeetingStatus>()
                .map_err(|e| DatabaseError::Integrity(e.to_string()))?,
            topics,
            processing_status: parse_processing_status(&row.processing_status)?,
            processing_method: row
                .processing_method
                .as_deref()
                .map(parse_processing_method)
                .transpose()?,
            processing_time_ms: row.processing_time_ms,
            fingerprint: row.vendor_fingerprint,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_processing_status(raw: &str) -> Result<ProcessingStatus, DatabaseError> {
    match raw {
        "pending" => Ok(ProcessingStatus::Pending),
        "processing" => Ok(ProcessingStatus::Processing),
        "completed" => Ok(ProcessingStatus::Completed),
        "failed" => Ok(ProcessingStatus::Failed),
        other => Err(DatabaseError::Integrity(format!(
            "unknown processing_status {other:?}"
        ))),
    }
}

fn parse_processing_method(raw: &str) -> Result<ProcessingMethod, DatabaseError> {
    match raw {
        "item-based" => Ok(ProcessingMethod::ItemBased),
        "monolithic" => Ok(ProcessingMethod::Monolithic),
        "batch" => Ok(ProcessingMethod::Batch),
        other => Err(DatabaseError::Integrity(format!(
            "unknown processing_method {other:?}"
        ))),
    }
}
