use crate::error::StorageError;
use crate::record::{Stats, UrlRecord};
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The persistence contract every backend implements.
///
/// Save policy shared by all implementations: a code that is absent is
/// inserted; a code already stored with the same URL is left untouched
/// (owner, correlation id and tombstone included); a code stored with a
/// different URL is rejected with [`StorageError::Conflict`].
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Persists a single record.
    async fn save(&self, record: UrlRecord) -> Result<()>;

    /// Persists all records or none of them.
    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()>;

    /// Retrieves the record for a given short code, tombstoned or not.
    /// Returns `None` if the code does not exist.
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>>;

    /// Returns every record owned by `user_id`, ordered by short code.
    async fn urls_by_user(&self, user_id: &str) -> Result<Vec<UrlRecord>>;

    /// Tombstones the given codes that are owned by `user_id`.
    ///
    /// Unknown codes and codes owned by someone else are skipped. Returns
    /// the number of records that went from live to deleted.
    async fn delete_urls(&self, codes: &[ShortCode], user_id: &str) -> Result<usize>;

    async fn stats(&self) -> Result<Stats>;

    /// Connectivity check. In-process backends are always reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases the backend's resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
