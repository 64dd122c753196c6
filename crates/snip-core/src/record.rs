use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};

/// A stored URL record.
///
/// This is the unit every backend persists. The file backend writes it as
/// one JSON object per line using the field names below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Lookup key derived from the original URL.
    pub short_code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// Opaque caller token used to correlate batch requests and responses.
    #[serde(default)]
    pub correlation_id: String,
    /// Owner of the record. Empty for anonymous records.
    #[serde(default)]
    pub user_id: String,
    /// Tombstone. Once set it is never cleared.
    #[serde(default)]
    pub is_deleted: bool,
}

impl UrlRecord {
    /// Creates a live record with an empty correlation id.
    pub fn new(
        short_code: ShortCode,
        original_url: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
            correlation_id: String::new(),
            user_id: user_id.into(),
            is_deleted: false,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Returns `true` if `user_id` owns this record.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Aggregate counters reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Total number of records, tombstoned ones included.
    pub urls: u64,
    /// Number of distinct non-empty owners.
    pub users: u64,
}
