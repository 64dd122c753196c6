use crate::index::RecordIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::storage::{Result, StorageBackend};
use snip_core::{ShortCode, Stats, StorageError, UrlRecord};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a [`FileStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    Uninitialized,
    /// Replaying the log into the index.
    Recovering,
    /// Serving reads and appending writes.
    Ready,
    /// Closed; every write is refused.
    Closed,
}

/// Outcome of replaying the log on open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Non-blank lines read.
    pub lines: usize,
    /// Lines decoded and applied to the index.
    pub applied: usize,
    /// Lines that failed to decode and were ignored.
    pub skipped: usize,
    /// Distinct short codes after replay.
    pub records: usize,
}

/// A log-structured [`StorageBackend`] backed by an append-only file.
///
/// Every mutation is appended as one JSON line and synced before the
/// in-memory index is updated. On open the whole log is replayed from the
/// start; a later line for a code replaces any earlier one, which is how
/// tombstones take effect without rewriting history.
///
/// Mutations are serialized by the log lock, which is held across the
/// check, the append and the index update. Reads only touch the index.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    log: Mutex<File>,
    index: RwLock<RecordIndex>,
    state: RwLock<StorageState>,
    report: RecoveryReport,
}

impl FileStorage {
    /// Opens (or creates) the log at `path` and rebuilds the index from it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = StorageState::Uninitialized;
        trace!(path = %path.display(), ?state, "opening storage log");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        state = StorageState::Recovering;
        info!(path = %path.display(), ?state, "replaying storage log");

        let (index, report, torn_tail) = replay(&mut file).await?;
        if torn_tail {
            // keep the next append from being glued onto the torn line
            warn!(path = %path.display(), "storage log ends with a partial line");
            file.write_all(b"\n").await?;
            file.flush().await?;
            file.sync_data().await?;
        }

        state = StorageState::Ready;
        info!(
            path = %path.display(),
            ?state,
            lines = report.lines,
            applied = report.applied,
            skipped = report.skipped,
            records = report.records,
            "storage log recovered"
        );

        Ok(Self {
            path,
            log: Mutex::new(file),
            index: RwLock::new(index),
            state: RwLock::new(state),
            report,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> StorageState {
        *self.state.read()
    }

    /// Returns what the replay on open found.
    pub fn recovery_report(&self) -> RecoveryReport {
        self.report
    }

    /// Acquires the log for a mutation, refusing if the storage is closed.
    async fn writer(&self) -> Result<MutexGuard<'_, File>> {
        let log = self.log.lock().await;
        if self.state() != StorageState::Ready {
            return Err(StorageError::Unavailable(format!(
                "storage log {} is closed",
                self.path.display()
            )));
        }
        Ok(log)
    }

    /// Appends `records` as one write and syncs it.
    ///
    /// On failure the file is cut back to its previous length so a failed
    /// batch leaves no lines behind.
    async fn append(&self, log: &mut File, records: &[UrlRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(records.len() * 128);
        for record in records {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            buf.push(b'\n');
        }

        let offset = log.metadata().await?.len();
        if let Err(err) = write_synced(log, &buf).await {
            error!(path = %self.path.display(), error = %err, "append to storage log failed");
            if let Err(truncate_err) = log.set_len(offset).await {
                error!(
                    path = %self.path.display(),
                    error = %truncate_err,
                    "failed to roll back partial append"
                );
            }
            return Err(err.into());
        }

        trace!(path = %self.path.display(), lines = records.len(), "appended to storage log");
        Ok(())
    }
}

async fn write_synced(log: &mut File, buf: &[u8]) -> std::io::Result<()> {
    log.write_all(buf).await?;
    log.flush().await?;
    log.sync_data().await
}

/// Rebuilds the index from the log, last line per code winning except
/// that tombstones stick.
///
/// Returns the index, the report and whether the log ends in a partial line.
async fn replay(file: &mut File) -> Result<(RecordIndex, RecoveryReport, bool)> {
    let mut index = RecordIndex::new();
    let mut report = RecoveryReport::default();
    let mut torn_tail = false;

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            break;
        }
        line_no += 1;
        torn_tail = line.last() != Some(&b'\n');

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        report.lines += 1;

        match serde_json::from_slice::<UrlRecord>(trimmed) {
            Ok(mut record) => {
                // a tombstone is never cleared by a later line
                if index.get(&record.short_code).is_some_and(|prev| prev.is_deleted) {
                    record.is_deleted = true;
                }
                index.insert(record);
                report.applied += 1;
            }
            Err(err) => {
                warn!(
                    line = line_no,
                    error = %err,
                    content = %String::from_utf8_lossy(trimmed),
                    "skipping malformed storage log line"
                );
                report.skipped += 1;
            }
        }
    }

    report.records = index.len();
    Ok((index, report, torn_tail))
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn save(&self, record: UrlRecord) -> Result<()> {
        let mut log = self.writer().await?;

        let needs_write = {
            let index = self.index.read();
            index.plan_save(&record)?
        };
        if !needs_write {
            trace!(code = %record.short_code, "record already stored");
            return Ok(());
        }

        self.append(&mut log, std::slice::from_ref(&record)).await?;
        debug!(code = %record.short_code, "stored record");
        self.index.write().insert(record);
        Ok(())
    }

    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut log = self.writer().await?;

        let writes = {
            let index = self.index.read();
            index.plan_batch(records)?
        };

        self.append(&mut log, &writes).await?;
        debug!(count = writes.len(), "stored batch");

        let mut index = self.index.write();
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
        let mut log = self.writer().await?;

        let tombstones = {
            let index = self.index.read();
            index.plan_delete(codes, user_id)
        };

        self.append(&mut log, &tombstones).await?;
        let deleted = tombstones.len();
        debug!(user_id, deleted, "tombstoned records");

        let mut index = self.index.write();
        for record in tombstones {
            index.insert(record);
        }
        Ok(deleted)
    }

    async fn stats(&self) -> Result<Stats> {
        Ok(self.index.read().stats())
    }

    async fn close(&self) -> Result<()> {
        let mut log = self.log.lock().await;
        if self.state() == StorageState::Closed {
            return Ok(());
        }

        log.flush().await?;
        log.sync_all().await?;
        *self.state.write() = StorageState::Closed;
        info!(path = %self.path.display(), "storage log closed");
        Ok(())
    }
}
