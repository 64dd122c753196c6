use async_trait::async_trait;
use snip_core::storage::{Result, StorageBackend};
use snip_core::{ShortCode, Stats, StorageError, UrlRecord};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info, trace};

/// Schema applied by [`PostgresStorage::migrate`].
pub const SCHEMA: &str = include_str!("../ddl/postgres/short_urls.sql");

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Postgres implementation of the storage contract.
///
/// One row per short code. Soft delete is the `is_deleted` flag; rows are
/// never removed. Batches run in a single transaction, so a failing item
/// rolls back every earlier insert of the same batch.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a storage from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a new connection pool and applies the schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        info!(max_connections, "connected to postgres storage");
        Ok(storage)
    }

    /// Creates the `short_urls` table if it does not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn row_to_record(row: PgRow) -> Result<UrlRecord> {
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let short_code = ShortCode::new(short_code)
        .map_err(|e| StorageError::InvalidData(e.to_string()))?;

    Ok(UrlRecord {
        short_code,
        original_url: row.try_get("url").map_err(map_sqlx_error)?,
        correlation_id: row.try_get("correlation_id").map_err(map_sqlx_error)?,
        user_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

/// Inserts `record` unless its code is already taken by the same URL.
///
/// The bare `ON CONFLICT` covers both unique indexes, so racing inserts of
/// the same record wait for each other instead of failing.
async fn insert_record(conn: &mut PgConnection, record: &UrlRecord) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO short_urls (short_code, url, correlation_id, user_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(record.short_code.as_str())
    .bind(&record.original_url)
    .bind(&record.correlation_id)
    .bind(&record.user_id)
    .execute(&mut *conn)
    .await;

    let inserted = match result {
        Ok(done) => done.rows_affected() > 0,
        Err(err) if is_unique_violation(&err) => {
            return Err(StorageError::Conflict(record.short_code.to_string()))
        }
        Err(err) => return Err(map_sqlx_error(err)),
    };

    if inserted {
        return Ok(());
    }

    let stored_url: Option<String> =
        sqlx::query_scalar("SELECT url FROM short_urls WHERE short_code = $1")
            .bind(record.short_code.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

    match stored_url {
        Some(url) if url == record.original_url => {
            trace!(code = %record.short_code, "record already stored");
            Ok(())
        }
        // the code holds another URL, or the URL sits under another code
        _ => Err(StorageError::Conflict(record.short_code.to_string())),
    }
}

#[async_trait]
impl StorageBackend for PostgresStorage {
    async fn save(&self, record: UrlRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        insert_record(&mut conn, &record).await?;
        debug!(code = %record.short_code, "stored record");
        Ok(())
    }

    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for record in &records {
            if let Err(err) = insert_record(&mut tx, record).await {
                debug!(code = %record.short_code, error = %err, "rolling back batch");
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Err(err);
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(count = records.len(), "stored batch");
        Ok(())
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        trace!(code = %code, "looking up record");

        let row = sqlx::query(
            r#"
            SELECT short_code, url, correlation_id, user_id, is_deleted
            FROM short_urls
            WHERE short_code = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(row_to_record).transpose()
    }

    async fn urls_by_user(&self, user_id: &str) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT short_code, url, correlation_id, user_id, is_deleted
            FROM short_urls
            WHERE user_id = $1
            ORDER BY short_code
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn delete_urls(&self, codes: &[ShortCode], user_id: &str) -> Result<usize> {
        if codes.is_empty() {
            return Ok(0);
        }

        let codes: Vec<String> = codes.iter().map(|c| c.as_str().to_owned()).collect();
        let result = sqlx::query(
            r#"
            UPDATE short_urls
            SET is_deleted = TRUE
            WHERE user_id = $1
              AND short_code = ANY($2)
              AND NOT is_deleted
            "#,
        )
        .bind(user_id)
        .bind(codes)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected() as usize;
        debug!(user_id, deleted, "tombstoned records");
        Ok(deleted)
    }

    async fn stats(&self) -> Result<Stats> {
        let urls: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM short_urls")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let users: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM short_urls WHERE user_id <> ''")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(Stats {
            urls: urls as u64,
            users: users as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("postgres storage closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_availability_classes() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StorageError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::InvalidData(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::Protocol("bad".into())),
            StorageError::Query(_)
        ));
    }

    #[test]
    fn schema_keys_on_short_code() {
        assert!(SCHEMA.contains("short_code     VARCHAR(32)  PRIMARY KEY"));
        assert!(SCHEMA.contains("url            TEXT         NOT NULL UNIQUE"));
        assert!(SCHEMA.contains("is_deleted     BOOLEAN      NOT NULL DEFAULT FALSE"));
    }
}
