// Error taxonomy for the ingestion core.
//
// Each kind has a fixed propagation policy: repositories raise DatabaseError
// only, adapters raise VendorError only, the processor absorbs
// Extraction/Processing errors locally (partial results are acceptable) and
// lets everything else bubble to the worker loop, which records the failure
// on the job and applies retry-or-dead-letter.

use std::time::Duration;

/// Caller supplied bad arguments. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid banana: {0}")]
    InvalidBanana(String),

    #[error("invalid state code: {0:?}")]
    InvalidState(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// An external civic-tech site misbehaved. The HTTP layer retries transient
/// failures; on exhaustion the current sync job fails with this.
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("vendor rate limited{}", retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("could not parse vendor response: {0}")]
    Parsing(String),
}

/// A document could not be turned into usable text. Not retried; the
/// affected item keeps a null summary.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("document at {url} exceeds the {limit_mb}MB limit")]
    TooLarge { url: String, limit_mb: u64 },

    #[error("no text could be recovered from {url}")]
    NoText { url: String },
}

/// The LLM returned unusable output after the repair retry. The job itself
/// still completes.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("llm call failed: {0}")]
    Llm(String),

    #[error("llm response failed schema validation: {0}")]
    InvalidResponse(String),

    #[error("batch of {expected} items returned {got} results")]
    BatchShape { expected: usize, got: usize },
}

/// Transient or permanent database failure. Transient SQLSTATEs are retried
/// once inside the transaction scope; what escapes aborts the job so the
/// queue can retry it.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl DatabaseError {
    /// Serialization failures and deadlocks are worth one immediate retry.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Sqlx(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            DatabaseError::Sqlx(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

/// Required configuration missing or malformed at startup. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Umbrella for the worker loops, which must record any failure kind on the
/// job row before deciding retry-or-dead-letter.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_covers_serialization_failures() {
        let err = DatabaseError::Integrity("count mismatch".into());
        assert!(!err.is_transient());

        let err = DatabaseError::Sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }

    #[test]
    fn vendor_error_messages_carry_the_url() {
        let err = VendorError::HttpStatus {
            url: "https://granicus.example.com/ViewPublisher.php".into(),
            status: 503,
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("ViewPublisher"));
    }
}
