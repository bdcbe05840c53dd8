use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MEMORY_MAX_BYTES: u64 = 64 * 1024 * 1024; // 64MB
const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 30;

/// Cache configuration shared by every manager of a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding one subdirectory per manager name
    pub root_dir: PathBuf,
    /// Upper bound on payload bytes held by each memory tier
    pub memory_max_bytes: u64,
    /// Drop memory entries not read for this long
    pub memory_time_to_idle: Option<Duration>,
    /// Period of the memory reclamation cycle when enabled
    pub reclaim_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            memory_max_bytes: DEFAULT_MEMORY_MAX_BYTES,
            memory_time_to_idle: None,
            reclaim_interval: Duration::from_secs(DEFAULT_RECLAIM_INTERVAL_SECS),
        }
    }
}

impl CacheConfig {
    /// Configuration rooted at `root_dir` with default limits
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let root_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.root_dir);

        let memory_max_bytes = env::var("CACHE_MEMORY_MAX_BYTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.memory_max_bytes);

        let memory_time_to_idle = env::var("CACHE_MEMORY_IDLE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let reclaim_interval = env::var("CACHE_RECLAIM_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.reclaim_interval);

        Self {
            root_dir,
            memory_max_bytes,
            memory_time_to_idle,
            reclaim_interval,
        }
    }
}

fn default_root_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("tiered-cache"))
        .unwrap_or_else(|| PathBuf::from("./cache"))
}
