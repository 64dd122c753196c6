use serde::{Deserialize, Serialize};
use snip_generator::sha256::DEFAULT_PREFIX_LEN;
use snip_storage::postgres::DEFAULT_MAX_CONNECTIONS;
use snip_storage::StorageConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use typed_builder::TypedBuilder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_FILE_STORAGE_PATH: &str = "storage.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Backend family, before its settings are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    InMemory,
    File,
    Postgres,
}

/// Settings of a running shortener, built once at startup and handed to
/// the service and storage constructors.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct ShortenerConfig {
    /// Prefix of every returned short URL.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    #[builder(default = StorageConfig::InMemory)]
    pub storage: StorageConfig,
    /// Digest bytes kept per short code.
    #[builder(default = DEFAULT_PREFIX_LEN)]
    pub code_bytes: usize,
}

/// One partial layer of configuration: command line, environment or a
/// JSON config file. Unknown keys in the file are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigSource {
    pub base_url: Option<String>,
    pub storage: Option<StorageKind>,
    pub file_storage_path: Option<PathBuf>,
    pub database_dsn: Option<String>,
    pub max_connections: Option<u32>,
    pub code_bytes: Option<usize>,
}

impl ConfigSource {
    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fills every field left unset in `self` from `fallback`.
    ///
    /// Empty strings count as unset.
    pub fn or(self, fallback: ConfigSource) -> Self {
        Self {
            base_url: non_empty(self.base_url).or(non_empty(fallback.base_url)),
            storage: self.storage.or(fallback.storage),
            file_storage_path: self
                .file_storage_path
                .filter(|p| !p.as_os_str().is_empty())
                .or(fallback.file_storage_path),
            database_dsn: non_empty(self.database_dsn).or(non_empty(fallback.database_dsn)),
            max_connections: self.max_connections.or(fallback.max_connections),
            code_bytes: self.code_bytes.or(fallback.code_bytes),
        }
    }

    /// Applies defaults and builds the final configuration.
    ///
    /// Without an explicit backend, a database DSN selects Postgres and
    /// anything else selects the file log.
    pub fn resolve(self) -> Result<ShortenerConfig, ConfigError> {
        let database_dsn = non_empty(self.database_dsn);
        let kind = self.storage.unwrap_or(if database_dsn.is_some() {
            StorageKind::Postgres
        } else {
            StorageKind::File
        });

        let storage = match kind {
            StorageKind::InMemory => StorageConfig::InMemory,
            StorageKind::File => StorageConfig::File {
                path: self
                    .file_storage_path
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_STORAGE_PATH)),
            },
            StorageKind::Postgres => StorageConfig::Postgres {
                dsn: database_dsn.ok_or_else(|| {
                    ConfigError::Invalid("database dsn is required for postgres storage".into())
                })?,
                max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            },
        };

        Ok(ShortenerConfig {
            base_url: non_empty(self.base_url).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            storage,
            code_bytes: self.code_bytes.unwrap_or(DEFAULT_PREFIX_LEN),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
