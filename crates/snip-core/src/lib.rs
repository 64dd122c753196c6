//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the shared record model, the storage contract
//! implemented by every backend, and the shortener contract consumed by
//! outer layers.

pub mod error;
pub mod record;
pub mod shortcode;
pub mod shortener;
pub mod storage;

pub use error::{CoreError, ShortenerError, StorageError};
pub use record::{Stats, UrlRecord};
pub use shortcode::ShortCode;
pub use shortener::{BatchRequestItem, BatchResponseItem, Shortener};
pub use storage::StorageBackend;
