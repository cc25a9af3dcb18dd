// Durable priority queue over the queue_jobs table. The claim is a single
// statement (UPDATE over a SKIP LOCKED select) so competing workers never
// double-claim; retry backoff and dead-lettering live in mark_failed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::errors::DatabaseError;
use crate::types::{JobKind, JobStatus, QueueJob};

/// Retry delay: 10s * 2^attempts.
const RETRY_BASE: Duration = Duration::from_secs(10);

/// A claimed job, as handed to a worker.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimedJob {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub attempts: i32,
}

impl ClaimedJob {
    pub fn kind(&self) -> Result<JobKind, DatabaseError> {
        self.kind
            .parse()
            .map_err(|e: crate::errors::ValidationError| DatabaseError::Integrity(e.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead_letter: i64,
    pub oldest_pending_age_secs: Option<i64>,
}

pub struct QueueRepo;

impl QueueRepo {
    /// Enqueue a job, idempotent on `(kind, payload)` while a pending row
    /// exists. Returns the job id, or None when it was already queued.
    #[instrument(skip(conn))]
    pub async fn enqueue(
        conn: &mut PgConnection,
        kind: JobKind,
        payload: &str,
        priority: i32,
    ) -> Result<Option<i64>, DatabaseError> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO queue_jobs (kind, payload, priority, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (kind, payload) WHERE status = 'pending'
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(kind.as_str())
        .bind(payload)
        .bind(priority)
        .fetch_optional(conn)
        .await?;
        Ok(id)
    }

    /// Atomically claim the highest-priority due job of the given kinds:
    /// select with FOR UPDATE SKIP LOCKED, flip to processing, bump
    /// attempts. Each worker pool passes the kinds it handles.
    #[instrument(skip(conn, kinds))]
    pub async fn get_next_job(
        conn: &mut PgConnection,
        kinds: &[JobKind],
    ) -> Result<Option<ClaimedJob>, DatabaseError> {
        let kind_names: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
        let job: Option<ClaimedJob> = sqlx::query_as(
            r#"
            UPDATE queue_jobs
            SET status = 'processing',
                started_at = NOW(),
                attempts = attempts + 1
            WHERE id = (
                SELECT id
                FROM queue_jobs
                WHERE status = 'pending'
                  AND kind = ANY($1)
                  AND (run_after IS NULL OR run_after <= NOW())
                ORDER BY priority DESC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, kind, payload, attempts
            "#,
        )
        .bind(kind_names)
        .fetch_optional(conn)
        .await?;
        Ok(job)
    }

    #[instrument(skip(conn))]
    pub async fn mark_complete(conn: &mut PgConnection, id: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'completed',
                completed_at = NOW(),
                last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Record a failure. Below the attempt cap the job returns to pending
    /// after an exponential delay; at the cap it dead-letters with the
    /// error retained for inspection.
    #[instrument(skip(conn, error))]
    pub async fn mark_failed(
        conn: &mut PgConnection,
        id: i64,
        error: &str,
        max_attempts: i32,
    ) -> Result<JobStatus, DatabaseError> {
        let attempts: i32 = sqlx::query_scalar("SELECT attempts FROM queue_jobs WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        if attempts >= max_attempts {
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET status = 'dead_letter',
                    completed_at = NOW(),
                    last_error = $2
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(error)
            .execute(conn)
            .await?;
            return Ok(JobStatus::DeadLetter);
        }

        let delay = RETRY_BASE.as_secs() as i64 * 2i64.saturating_pow(attempts.max(0) as u32);
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'pending',
                run_after = NOW() + ($2 * INTERVAL '1 second'),
                last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delay)
        .bind(error)
        .execute(conn)
        .await?;
        Ok(JobStatus::Pending)
    }

    /// Reclaim jobs whose worker died mid-flight: processing rows older
    /// than the lease go back to pending, unless their attempts are
    /// already spent, in which case they dead-letter.
    #[instrument(skip(conn))]
    pub async fn reset_stuck(
        conn: &mut PgConnection,
        lease: Duration,
        max_attempts: i32,
    ) -> Result<u64, DatabaseError> {
        let lease_secs = lease.as_secs() as i64;

        let dead = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'dead_letter',
                completed_at = NOW(),
                last_error = COALESCE(last_error, 'lease expired')
            WHERE status = 'processing'
              AND started_at < NOW() - ($1 * INTERVAL '1 second')
              AND attempts >= $2
            "#,
        )
        .bind(lease_secs)
        .bind(max_attempts)
        .execute(&mut *conn)
        .await?;

        let reset = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'pending',
                started_at = NULL
            WHERE status = 'processing'
              AND started_at < NOW() - ($1 * INTERVAL '1 second')
            "#,
        )
        .bind(lease_secs)
        .execute(conn)
        .await?;

        Ok(dead.rows_affected() + reset.rows_affected())
    }

    #[instrument(skip(conn))]
    pub async fn get_stats(conn: &mut PgConnection) -> Result<QueueStats, DatabaseError> {
        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM queue_jobs GROUP BY status")
                .fetch_all(&mut *conn)
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in counts {
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "dead_letter" => stats.dead_letter = count,
                _ => {}
            }
        }

        let oldest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MIN(created_at) FROM queue_jobs WHERE status = 'pending'",
        )
        .fetch_one(conn)
        .await?;
        stats.oldest_pending_age_secs = oldest.map(|t| (Utc::now() - t).num_seconds());

        Ok(stats)
    }

    #[instrument(skip(conn))]
    pub async fn get_job(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<QueueJob>, DatabaseError> {
        #[derive(sqlx::FromRow)]
        struct JobRow {
            id: i64,
            kind: String,
            payload: String,
            priority: i32,
            status: String,
            attempts: i32,
            last_error: Option<String>,
            created_at: DateTime<Utc>,
            started_at: Option<DateTime<Utc>>,
            completed_at: Option<DateTime<Utc>>,
        }

        let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT id, kind, payload, priority, status, attempts, last_error,
                   created_at, started_at, completed_at
            FROM queue_jobs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        row.map(|row| {
            Ok(QueueJob {
                id: row.id,
                kind: row
                    .kind
                    .parse()
                    .map_err(|e: crate::errors::ValidationError| {
                        DatabaseError::Integrity(e.to_string())
                    })?,
                payload: row.payload,
                priority: row.priority,
                status: parse_status(&row.status)?,
                attempts: row.attempts,
                last_error: row.last_error,
                created_at: row.created_at,
                started_at: row.started_at,
                completed_at: row.completed_at,
            })
        })
        .transpose()
    }
}

/// Priority for a processing job: recent meetings jump the line.
/// `max(0, 100 - days_since_meeting)`; undated meetings sit at the floor,
/// upcoming meetings land above 100 and go first.
pub fn meeting_priority(meeting_date: Option<chrono::NaiveDateTime>, now: DateTime<Utc>) -> i32 {
    match meeting_date {
        Some(date) => {
            let days_since = (now.date_naive() - date.date()).num_days();
            (100 - days_since).max(0) as i32
        }
        None => 0,
    }
}

/// Default priority for city sync jobs.
pub const SYNC_PRIORITY: i32 = 50;

fn parse_status(raw: &str) -> Result<JobStatus, DatabaseError> {
    match raw {
        "pending" => Ok(JobStatus::Pending),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "dead_letter" => Ok(JobStatus::DeadLetter),
        other => Err(DatabaseError::Integrity(format!(
            "unknown job status {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use pretty_assertions::assert_eq;

    #[test]
    fn priority_decays_with_age() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let date = |y, m, d| {
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_time(NaiveTime::MIN)
        };
        assert_eq!(meeting_priority(Some(date(2025, 7, 1)), now), 100);
        assert_eq!(meeting_priority(Some(date(2025, 6, 1)), now), 70);
        assert_eq!(meeting_priority(Some(date(2024, 7, 1)), now), 0);
        // Upcoming meetings rank above today's.
        assert_eq!(meeting_priority(Some(date(2025, 8, 1)), now), 131);
        assert_eq!(meeting_priority(None, now), 0);
    }
}
