#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::LogpondConfig;
pub use error::{CacheError, ConfigError, LogpondError, StorageError};
pub use store::{DedupCache, RecordQuery, RecordStore, RecordWriter};
pub use types::{Action, CimRecord, CANONICAL_FIELDS, HASH_TIMESTAMP_FORMAT};
