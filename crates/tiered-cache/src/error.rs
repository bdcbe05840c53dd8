//! Error types for the tiered cache

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CacheError {
    /// A durable read, write or delete failed. `key` is `None` for namespace-wide operations.
    StorageIo {
        key: Option<String>,
        source: Box<io::Error>,
    },
    InvalidKey(String),
    Serialization(String),
    Scheduler(String),
    Config(String),
}

impl CacheError {
    pub(crate) fn storage(key: impl Into<String>, err: io::Error) -> Self {
        CacheError::StorageIo {
            key: Some(key.into()),
            source: Box::new(err),
        }
    }

    pub(crate) fn namespace(err: io::Error) -> Self {
        CacheError::StorageIo {
            key: None,
            source: Box::new(err),
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::StorageIo {
                key: Some(key),
                source,
            } => write!(f, "Storage error for key {:?}: {}", key, source),
            CacheError::StorageIo { key: None, source } => {
                write!(f, "Storage error: {}", source)
            }
            CacheError::InvalidKey(key) => write!(f, "Invalid cache key: {:?}", key),
            CacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CacheError::Scheduler(msg) => write!(f, "Scheduler error: {}", msg),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::StorageIo { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
