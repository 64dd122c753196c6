//! URL shortening service.
//!
//! This crate wires a [`Generator`](snip_generator::Generator) and a
//! [`StorageBackend`](snip_core::StorageBackend) into the
//! [`ShortenerService`], the only entry point outer layers call. Core types
//! are re-exported from `snip_core`.

pub mod config;
pub mod service;

pub use config::{ConfigError, ConfigSource, ShortenerConfig, StorageKind};
pub use service::ShortenerService;
pub use snip_core::{
    BatchRequestItem, BatchResponseItem, ShortCode, Shortener, ShortenerError, Stats, UrlRecord,
};
