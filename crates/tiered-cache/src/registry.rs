//! Named manager registry

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::manager::CacheManager;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

/// Name of the process-wide shared manager
pub const DEFAULT_MANAGER_NAME: &str = "default";

static GLOBAL: LazyLock<CacheRegistry> =
    LazyLock::new(|| CacheRegistry::new(CacheConfig::from_env()));

/// Hands out one [`CacheManager`] per name, all rooted in the same directory.
///
/// Managers live as long as the registry.
pub struct CacheRegistry {
    config: CacheConfig,
    managers: Mutex<HashMap<String, Arc<CacheManager>>>,
}

impl CacheRegistry {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry, configured from the environment on first use
    pub fn global() -> &'static CacheRegistry {
        &GLOBAL
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Existing manager for `name`, or a newly registered one
    pub fn instance(&self, name: &str) -> Result<Arc<CacheManager>> {
        if name.is_empty() {
            return Err(CacheError::Config(
                "cache manager name must not be empty".to_string(),
            ));
        }
        Ok(self.get_or_create(name))
    }

    pub fn default_instance(&self) -> Arc<CacheManager> {
        self.get_or_create(DEFAULT_MANAGER_NAME)
    }

    fn get_or_create(&self, name: &str) -> Arc<CacheManager> {
        let mut managers = self.managers.lock().unwrap_or_else(PoisonError::into_inner);
        managers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CacheManager::new(name, &self.config)))
            .clone()
    }

    /// Names of every manager created so far
    pub fn names(&self) -> Vec<String> {
        let managers = self.managers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = managers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent::PersistentStore;
    use tempfile::tempdir;

    #[test]
    fn test_same_name_same_manager() {
        let dir = tempdir().unwrap();
        let registry = CacheRegistry::new(CacheConfig::with_root(dir.path()));

        let a = registry.instance("images").unwrap();
        let b = registry.instance("images").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.names(), vec!["images".to_string()]);
    }

    #[test]
    fn test_default_instance() {
        let dir = tempdir().unwrap();
        let registry = CacheRegistry::new(CacheConfig::with_root(dir.path()));

        let a = registry.default_instance();
        let b = registry.instance(DEFAULT_MANAGER_NAME).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "default");
        assert_eq!(
            a.dir(),
            PersistentStore::namespace_dir(dir.path(), DEFAULT_MANAGER_NAME)
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempdir().unwrap();
        let registry = CacheRegistry::new(CacheConfig::with_root(dir.path()));
        assert!(matches!(registry.instance(""), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_concurrent_first_calls_yield_one_manager() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(CacheRegistry::new(CacheConfig::with_root(dir.path())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.default_instance())
            })
            .collect();
        let managers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(managers.iter().all(|m| Arc::ptr_eq(m, &managers[0])));
    }

    #[test]
    fn test_global_default_is_singleton() {
        let a = CacheManager::default_instance();
        let b = CacheManager::instance(DEFAULT_MANAGER_NAME).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
