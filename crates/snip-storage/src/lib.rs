//! Storage backends for the snip URL shortener.
//!
//! Three implementations of [`StorageBackend`] are provided: a plain
//! in-process map, an append-only file log replayed on startup, and a
//! Postgres table. [`open_storage`] picks one from a [`StorageConfig`].

pub mod factory;
pub mod file;
pub mod index;
pub mod memory;
pub mod postgres;

pub use factory::{open_storage, StorageConfig};
pub use file::{FileStorage, RecoveryReport, StorageState};
pub use index::RecordIndex;
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use snip_core::storage::{Result, StorageBackend};
pub use snip_core::{ShortCode, Stats, StorageError, UrlRecord};
