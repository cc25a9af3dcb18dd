// Matter store. Matters outlive the meetings they were seen in; nothing
// here cascades from cities or meetings, and the appearance-count column
// is kept in lockstep with the appearance rows by the tracker's
// transaction.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::PgConnection;
use tracing::instrument;

use crate::errors::DatabaseError;
use crate::types::{
    Banana, Matter, MatterAppearance, MatterDisposition, VoteOutcome, VoteTally,
};

#[derive(Debug, Clone, sqlx::FromRow)]
struct MatterRow {
    id: String,
    banana: String,
    matter_file: Option<String>,
    matter_id: Option<String>,
    title: String,
    canonical_summary: Option<String>,
    attachment_hash: Option<String>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    appearance_count: i32,
    status: Option<String>,
    final_vote_date: Option<NaiveDate>,
}

const MATTER_COLUMNS: &str = "id, banana, matter_file, matter_id, title, canonical_summary, \
     attachment_hash, first_seen, last_seen, appearance_count, status, final_vote_date";

/// New matter to insert.
#[derive(Debug, Clone)]
pub struct NewMatter<'a> {
    pub id: &'a str,
    pub banana: &'a Banana,
    pub matter_file: Option<&'a str>,
    pub matter_id: Option<&'a str>,
    pub title: &'a str,
    pub attachment_hash: Option<&'a str>,
    pub seen_at: DateTime<Utc>,
}

pub struct MatterRepo;

impl MatterRepo {
    /// Upsert on the composite id. An existing row keeps its canonical
    /// summary and tracking counters; only the display fields refresh.
    #[instrument(skip(conn, matter), fields(matter = %matter.id))]
    pub async fn store_matter(
        conn: &mut PgConnection,
        matter: &NewMatter<'_>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO city_matters (
                id, banana, matter_file, matter_id, title, attachment_hash,
                first_seen, last_seen, appearance_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, 1)
            ON CONFLICT (id)
            DO UPDATE SET
                matter_file = COALESCE(EXCLUDED.matter_file, city_matters.matter_file),
                matter_id = COALESCE(EXCLUDED.matter_id, city_matters.matter_id),
                title = EXCLUDED.title
            "#,
        )
        .bind(matter.id)
        .bind(matter.banana.as_str())
        .bind(matter.matter_file)
        .bind(matter.matter_id)
        .bind(matter.title)
        .bind(matter.attachment_hash)
        .bind(matter.seen_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument(skip(conn))]
    pub async fn get_matter(
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<Option<Matter>, DatabaseError> {
        let row: Option<MatterRow> = sqlx::query_as(&format!(
            "SELECT {MATTER_COLUMNS} FROM city_matters WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::hydrate(conn, row).await?)),
            None => Ok(None),
        }
    }

    /// Record one appearance. Returns false when this meeting was already
    /// recorded (re-sync), in which case tracking counters must not move.
    #[instrument(skip(conn))]
    pub async fn create_appearance(
        conn: &mut PgConnection,
        matter_id: &str,
        meeting_id: &str,
        appeared_at: Option<NaiveDateTime>,
        sequence: i32,
        vote_outcome: Option<VoteOutcome>,
        vote_tally: Option<&VoteTally>,
    ) -> Result<bool, DatabaseError> {
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO matter_appearances (
                matter_id, meeting_id, appeared_at, sequence, vote_outcome, vote_tally
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (matter_id, meeting_id)
            DO UPDATE SET
                appeared_at = EXCLUDED.appeared_at,
                vote_outcome = COALESCE(EXCLUDED.vote_outcome, matter_appearances.vote_outcome),
                vote_tally = COALESCE(EXCLUDED.vote_tally, matter_appearances.vote_tally)
            RETURNING (xmax = 0)
            "#,
        )
        .bind(matter_id)
        .bind(meeting_id)
        .bind(appeared_at)
        .bind(sequence)
        .bind(vote_outcome.map(|v| v.as_str()))
        .bind(vote_tally.map(Json))
        .fetch_one(conn)
        .await?;
        Ok(inserted)
    }

    /// Bump the tracking counters after a genuinely new appearance.
    #[instrument(skip(conn))]
    pub async fn update_matter_tracking(
        conn: &mut PgConnection,
        matter_id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<i32, DatabaseError> {
        let appearance_count: i32 = sqlx::query_scalar(
            r#"
            UPDATE city_matters
            SET last_seen = GREATEST(last_seen, $2),
                appearance_count = appearance_count + 1
            WHERE id = $1
            RETURNING appearance_count
            "#,
        )
        .bind(matter_id)
        .bind(last_seen)
        .fetch_one(conn)
        .await?;
        Ok(appearance_count)
    }

    /// Refresh the canonical copy after (re)processing.
    #[instrument(skip(conn, summary, topics))]
    pub async fn update_canonical(
        conn: &mut PgConnection,
        matter_id: &str,
        summary: &str,
        topics: &[String],
        attachment_hash: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE city_matters
            SET canonical_summary = $2,
                attachment_hash = COALESCE($3, attachment_hash)
            WHERE id = $1
            "#,
        )
        .bind(matter_id)
        .bind(summary)
        .bind(attachment_hash)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM matter_topics WHERE matter_id = $1")
            .bind(matter_id)
            .execute(&mut *conn)
            .await?;
        for topic in topics {
            sqlx::query(
                "INSERT INTO matter_topics (matter_id, topic) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(matter_id)
            .bind(topic)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Stamp a terminal disposition once a deciding vote is observed.
    #[instrument(skip(conn))]
    pub async fn set_disposition(
        conn: &mut PgConnection,
        matter_id: &str,
        disposition: MatterDisposition,
        vote_date: Option<NaiveDate>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE city_matters
            SET status = $2,
                final_vote_date = COALESCE($3, final_vote_date)
            WHERE id = $1
            "#,
        )
        .bind(matter_id)
        .bind(disposition.as_str())
        .bind(vote_date)
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument(skip(conn))]
    pub async fn get_appearances(
        conn: &mut PgConnection,
        matter_id: &str,
    ) -> Result<Vec<MatterAppearance>, DatabaseError> {
        #[derive(sqlx::FromRow)]
        struct AppearanceRow {
            matter_id: String,
            meeting_id: String,
            appeared_at: Option<NaiveDateTime>,
            sequence: i32,
            vote_outcome: Option<String>,
            vote_tally: Option<JsonValue>,
        }

        let rows: Vec<AppearanceRow> = sqlx::query_as(
            r#"
            SELECT matter_id, meeting_id, appeared_at, sequence, vote_outcome, vote_tally
            FROM matter_appearances
            WHERE matter_id = $1
            ORDER BY appeared_at ASC NULLS LAST, sequence ASC
            "#,
        )
        .bind(matter_id)
        .fetch_all(conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(MatterAppearance {
                    matter_id: row.matter_id,
                    meeting_id: row.meeting_id,
                    appeared_at: row.appeared_at,
                    sequence: row.sequence,
                    vote_outcome: row.vote_outcome.as_deref().and_then(VoteOutcome::parse),
                    vote_tally: row
                        .vote_tally
                        .map(serde_json::from_value)
                        .transpose()
                        .map_err(|e| DatabaseError::Integrity(format!("bad vote tally: {e}")))?,
                })
            })
            .collect()
    }

    /// Integrity check over the matter-tracking invariants: appearance
    /// counts match appearance rows, and every item's matter link resolves.
    #[instrument(skip(conn))]
    pub async fn validate_matter_tracking(
        conn: &mut PgConnection,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut problems = Vec::new();

        let count_mismatches: Vec<(String, i32, i64)> = sqlx::query_as(
            r#"
            SELECT m.id, m.appearance_count, COUNT(a.meeting_id) AS actual
            FROM city_matters m
            LEFT JOIN matter_appearances a ON a.matter_id = m.id
            GROUP BY m.id, m.appearance_count
            HAVING m.appearance_count <> COUNT(a.meeting_id)
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;
        for (id, recorded, actual) in count_mismatches {
            problems.push(format!(
                "matter {id}: appearance_count {recorded} but {actual} appearance rows"
            ));
        }

        let dangling: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT i.id FROM items i
            WHERE i.matter_id IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM city_matters m WHERE m.id = i.matter_id)
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;
        for (id,) in dangling {
            problems.push(format!("item {id}: matter_id points at no matter"));
        }

        Ok(problems)
    }

    async fn hydrate(conn: &mut PgConnection, row: MatterRow) -> Result<Matter, DatabaseError> {
        let topics: Vec<String> = sqlx::query_scalar(
            "SELECT topic FROM matter_topics WHERE matter_id = $1 ORDER BY topic",
        )
        .bind(&row.id)
        .fetch_all(conn)
        .await?;

        let status = row
            .status
            .as_deref()
            .map(parse_disposition)
            .transpose()?;

        Ok(Matter {
            banana: Banana::parse(&row.banana)
                .map_err(|e| DatabaseError::Integrity(e.to_string()))?,
            id: row.id,
            matter_file: row.matter_file,
            matter_id: row.matter_id,
            title: row.title,
            canonical_summary: row.canonical_summary,
            topics,
            attachment_hash: row.attachment_hash,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            appearance_count: row.appearance_count,
            status,
            final_vote_date: row.final_vote_date,
        })
    }
}

fn parse_disposition(raw: &str) -> Result<MatterDisposition, DatabaseError> {
    let disposition = match raw {
        "active" => MatterDisposition::Active,
        "passed" => MatterDisposition::Passed,
        "failed" => MatterDisposition::Failed,
        "tabled" => MatterDisposition::Tabled,
        "withdrawn" => MatterDisposition::Withdrawn,
        "referred" => MatterDisposition::Referred,
        "amended" => MatterDisposition::Amended,
        "vetoed" => MatterDisposition::Vetoed,
        "enacted" => MatterDisposition::Enacted,
        other => {
            return Err(DatabaseError::Integrity(format!(
                "unknown matter status {other:?}"
            )))
        }
    };
    Ok(disposition)
}
