use snip_core::storage::Result;
use snip_core::{ShortCode, Stats, StorageError, UrlRecord};
use std::collections::{HashMap, HashSet};

/// The in-memory `short_code -> record` map behind the in-process backends.
///
/// The index never decides on its own when to mutate: callers first ask it
/// to plan a save, persist whatever the plan says must be written, and only
/// then apply it. This keeps the file backend's index from ever running
/// ahead of its log.
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    records: HashMap<ShortCode, UrlRecord>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, code: &ShortCode) -> Option<&UrlRecord> {
        self.records.get(code)
    }

    /// Decides whether `record` has to be written.
    ///
    /// Returns `Ok(true)` for a new code, `Ok(false)` when the code already
    /// maps to the same URL, and `Err(Conflict)` when it maps to another one.
    pub fn plan_save(&self, record: &UrlRecord) -> Result<bool> {
        match self.records.get(&record.short_code) {
            None => Ok(true),
            Some(existing) if existing.original_url == record.original_url => Ok(false),
            Some(_) => Err(StorageError::Conflict(record.short_code.to_string())),
        }
    }

    /// Plans a whole batch, returning only the records that must be written.
    ///
    /// Fails as a unit: a single conflicting record, against the index or
    /// against an earlier item of the same batch, rejects the batch.
    pub fn plan_batch(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        let mut pending: HashMap<ShortCode, String> = HashMap::new();
        let mut writes = Vec::with_capacity(records.len());

        for record in records {
            if !self.plan_save(&record)? {
                continue;
            }

            match pending.get(&record.short_code) {
                Some(url) if *url == record.original_url => continue,
                Some(_) => return Err(StorageError::Conflict(record.short_code.to_string())),
                None => {
                    pending.insert(record.short_code.clone(), record.original_url.clone());
                    writes.push(record);
                }
            }
        }

        Ok(writes)
    }

    /// Stores `record`, replacing any previous entry for its code.
    pub fn insert(&mut self, record: UrlRecord) {
        self.records.insert(record.short_code.clone(), record);
    }

    /// Returns tombstoned copies of the live records among `codes` that
    /// `user_id` owns. Duplicate codes are reported once.
    pub fn plan_delete(&self, codes: &[ShortCode], user_id: &str) -> Vec<UrlRecord> {
        let mut seen = HashSet::new();

        codes
            .iter()
            .filter(|code| seen.insert(*code))
            .filter_map(|code| self.records.get(code))
            .filter(|record| record.is_owned_by(user_id) && !record.is_deleted)
            .map(|record| UrlRecord {
                is_deleted: true,
                ..record.clone()
            })
            .collect()
    }

    /// Returns every record owned by `user_id`, ordered by short code.
    pub fn by_user(&self, user_id: &str) -> Vec<UrlRecord> {
        let mut records: Vec<UrlRecord> = self
            .records
            .values()
            .filter(|record| record.is_owned_by(user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.short_code.cmp(&b.short_code));
        records
    }

    pub fn stats(&self) -> Stats {
        let users: HashSet<&str> = self
            .records
            .values()
            .map(|record| record.user_id.as_str())
            .filter(|user_id| !user_id.is_empty())
            .collect();

        Stats {
            urls: self.records.len() as u64,
            users: users.len() as u64,
        }
    }
}
