// Data access layer: six focused repositories over Postgres plus the
// caller-owned transaction scope. Repository methods execute single
// statements (or a tight sequence that must succeed together) against a
// borrowed connection and never commit or roll back themselves.

pub mod cache;
pub mod cities;
pub mod items;
pub mod matters;
pub mod meetings;
pub mod queue;
pub mod search;

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use tracing::warn;

use crate::errors::DatabaseError;

/// Open the connection pool and run pending migrations.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<PgPool, DatabaseError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(db_url)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Run `op` inside a transaction: commit on Ok, roll back on Err. A
/// serialization failure or deadlock is retried once before surfacing.
///
/// Repositories are written against `&mut PgConnection`, so the same call
/// works under this scope and on a bare pooled connection.
pub async fn transaction<T, F>(pool: &PgPool, op: F) -> Result<T, DatabaseError>
where
    F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, Result<T, DatabaseError>>,
{
    let mut retried = false;
    loop {
        let mut tx = pool.begin().await?;
        match op(&mut tx).await {
            Ok(value) => match tx.commit().await {
                Ok(()) => return Ok(value),
                Err(e) => {
                    let err = DatabaseError::from(e);
                    if !retried && err.is_transient() {
                        warn!(error = %err, "transaction commit hit a transient failure, retrying once");
                        retried = true;
                        continue;
                    }
                    return Err(err);
                }
            },
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                if !retried && err.is_transient() {
                    warn!(error = %err, "transaction hit a transient failure, retrying once");
                    retried = true;
                    continue;
                }
                return Err(err);
            }
        }
    }
}
