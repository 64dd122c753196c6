use crate::index::RecordIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::storage::{Result, StorageBackend};
use snip_core::{ShortCode, Stats, UrlRecord};
use tracing::{debug, trace};

/// In-memory implementation of [`StorageBackend`].
///
/// Nothing is persisted; the state lives as long as the process. A single
/// lock guards the index so a batch is checked and applied in one step.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    index: RwLock<RecordIndex>,
}

impl InMemoryStorage {
    /// Creates a new in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory storage with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: RwLock::new(RecordIndex::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn save(&self, record: UrlRecord) -> Result<()> {
        let mut index = self.index.write();
        if index.plan_save(&record)? {
            debug!(code = %record.short_code, "stored record");
            index.insert(record);
        }
        Ok(())
    }

    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut index = self.index.write();
        let writes = index.plan_batch(records)?;
        debug!(count = writes.len(), "stored batch");
        for record in writes {
            index.insert(record);
        }
        Ok(())
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        trace!(code = %code, "looking up record");
        Ok(self.index.read().get(code).cloned())
    }

    async fn urls_by_user(&self, user_id: &str) -> Result<Vec<UrlRecord>> {
        Ok(self.index.read().by_user(user_id))
    }

    async fn delete_urls(&self, codes: &[ShortCode], user_id: &str) -> Result<usize> {
        let mut index = self.index.write();
        let tombstones = index.plan_delete(codes, user_id);
        let deleted = tombstones.len();
        for record in tombstones {
            index.insert(record);
        }
        debug!(user_id, deleted, "tombstoned records");
        Ok(deleted)
    }

    async fn stats(&self) -> Result<Stats> {
        Ok(self.index.read().stats())
    }
}
