use clap::{Parser, Subcommand, ValueEnum};
use snip_shortener::{ConfigSource, StorageKind};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const BASE_URL_ENV: &str = "BASE_URL";
pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const CONFIG_ENV: &str = "CONFIG";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

impl From<StorageBackendArg> for StorageKind {
    fn from(arg: StorageBackendArg) -> Self {
        match arg {
            StorageBackendArg::InMemory => StorageKind::InMemory,
            StorageBackendArg::File => StorageKind::File,
            StorageBackendArg::Postgres => StorageKind::Postgres,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Content-addressable URL shortener")]
pub struct CLI {
    /// Prefix of every returned short URL [default: http://localhost:8080]
    #[arg(long, env = BASE_URL_ENV, global = true)]
    pub base_url: Option<String>,

    /// Storage backend; inferred from the DSN when unset
    #[arg(long, env = STORAGE_BACKEND_ENV, value_enum, global = true)]
    pub storage: Option<StorageBackendArg>,

    /// Append-only log used by the file backend [default: storage.txt]
    #[arg(long, env = FILE_STORAGE_PATH_ENV, global = true)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = DATABASE_DSN_ENV, global = true, hide_env_values = true)]
    pub database_dsn: Option<String>,

    /// JSON config file, overridden by flags and environment
    #[arg(long, env = CONFIG_ENV, global = true)]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormat::Text,
        global = true
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL
    Shorten {
        url: String,
        #[arg(long, default_value = "")]
        user: String,
    },
    /// Shorten every entry of a JSON array of {correlation_id, original_url}
    Batch {
        file: PathBuf,
        #[arg(long, default_value = "")]
        user: String,
    },
    /// Print the original URL behind a short code
    Resolve { code: String },
    /// List the records owned by a user
    List {
        #[arg(long)]
        user: String,
    },
    /// Tombstone short codes owned by a user
    Delete {
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    Stats,
    Ping,
}

impl CLI {
    /// Flags and environment, as the highest precedence layer.
    pub fn config_source(&self) -> ConfigSource {
        ConfigSource {
            base_url: self.base_url.clone(),
            storage: self.storage.map(StorageKind::from),
            file_storage_path: self.file_storage_path.clone(),
            database_dsn: self.database_dsn.clone(),
            ..Default::default()
        }
    }
}
