// Content-addressed processing cache: identical packet text never pays
// for a second LLM call. Keys are SHA-256 of the extracted text (or of the
// URL bytes when extraction is skipped).

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use sqlx::PgConnection;
use tracing::instrument;

use crate::errors::DatabaseError;
use crate::types::ProcessingMethod;

#[derive(Debug, Clone)]
pub struct CachedSummary {
    pub summary: String,
    pub topics: Vec<String>,
    pub method: String,
    pub hits: i32,
}

pub struct CacheRepo;

impl CacheRepo {
    /// Hash arbitrary content into a cache key.
    pub fn content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a cached summary, bumping the hit counter on success.
    #[instrument(skip(conn))]
    pub async fn lookup(
        conn: &mut PgConnection,
        content_hash: &str,
    ) -> Result<Option<CachedSummary>, DatabaseError> {
        #[derive(sqlx::FromRow)]
        struct CacheRow {
            summary: String,
            topics: JsonValue,
            method: String,
            hits: i32,
        }

        let row: Option<CacheRow> = sqlx::query_as(
            r#"
            UPDATE processing_cache
            SET hits = hits + 1,
                last_accessed = NOW()
            WHERE content_hash = $1
            RETURNING summary, topics, method, hits
            "#,
        )
        .bind(content_hash)
        .fetch_optional(conn)
        .await?;

        row.map(|row| {
            Ok(CachedSummary {
                summary: row.summary,
                topics: serde_json::from_value(row.topics)
                    .map_err(|e| DatabaseError::Integrity(format!("bad cached topics: {e}")))?,
                method: row.method,
                hits: row.hits,
            })
        })
        .transpose()
    }

    #[instrument(skip(conn, summary, topics))]
    pub async fn store(
        conn: &mut PgConnection,
        content_hash: &str,
        summary: &str,
        topics: &[String],
        method: ProcessingMethod,
        cost_cents: Option<i32>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO processing_cache (content_hash, summary, topics, method, cost_cents)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (content_hash)
            DO UPDATE SET
                summary = EXCLUDED.summary,
                topics = EXCLUDED.topics,
                method = EXCLUDED.method,
                last_accessed = NOW()
            "#,
        )
        .bind(content_hash)
        .bind(summary)
        .bind(Json(topics))
        .bind(method.as_str())
        .bind(cost_cents)
        .execute(conn)
        .await?;
        Ok(())
    }
}
