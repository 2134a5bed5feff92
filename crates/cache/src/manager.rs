//! Cache manager: lifecycle of per-account partitions
//!
//! Partitions are keyed by account email and opened lazily on first access.
//! Each partition is an independent database file, so deleting one account's
//! data never touches another's.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use log::{info, warn};

use crate::storage::{MemoryPartition, PartitionStore, SqlitePartition};

enum Backend {
    /// One SQLite file per account under this directory
    Disk(PathBuf),
    /// Memory-only partitions (tests)
    Memory,
}

/// Owns every open account partition
///
/// Concurrent callers for the same account share one partition instance;
/// callers for different accounts never block each other beyond the brief
/// registry lock.
pub struct CacheManager {
    backend: Backend,
    partitions: Mutex<HashMap<String, Arc<dyn PartitionStore>>>,
    closed: AtomicBool,
}

impl CacheManager {
    /// Manager backed by SQLite files under `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Disk(data_dir.into()),
            partitions: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Manager backed entirely by in-memory partitions
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            partitions: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the partition for an account, opening it on first access
    ///
    /// If the partition database cannot be opened, the account degrades to a
    /// memory-only partition rather than failing every request that needs it.
    pub fn partition(&self, account_key: &str) -> Result<Arc<dyn PartitionStore>> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("cache manager is closed");
        }

        let mut partitions = self.partitions.lock().unwrap();
        if let Some(partition) = partitions.get(account_key) {
            return Ok(Arc::clone(partition));
        }

        let partition: Arc<dyn PartitionStore> = match &self.backend {
            Backend::Memory => Arc::new(MemoryPartition::new()),
            Backend::Disk(data_dir) => {
                let db_path = data_dir.join(format!("{}.sqlite", sanitize_key(account_key)));
                match SqlitePartition::open(&db_path) {
                    Ok(store) => {
                        info!("Opened cache partition for {} at {:?}", account_key, db_path);
                        Arc::new(store)
                    }
                    Err(err) => {
                        // Degrade to remote-backed operation with a volatile
                        // cache instead of failing the account outright.
                        warn!(
                            "Cache partition for {} unavailable ({err:#}), using in-memory fallback",
                            account_key
                        );
                        Arc::new(MemoryPartition::new())
                    }
                }
            }
        };

        partitions.insert(account_key.to_string(), Arc::clone(&partition));
        Ok(partition)
    }

    /// Accounts with an open partition
    pub fn open_accounts(&self) -> Vec<String> {
        self.partitions.lock().unwrap().keys().cloned().collect()
    }

    /// Release every open partition
    ///
    /// Safe to call once during shutdown and a no-op thereafter. Callers must
    /// stop the sync engine first so no background loop still holds work
    /// against a partition being released.
    pub fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut partitions = self.partitions.lock().unwrap();
        let count = partitions.len();
        partitions.clear();
        info!("Closed {} cache partition(s)", count);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Turn an account key (usually an email address) into a safe filename stem
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CachedEmail, EmailId, Mailbox};
    use tempfile::tempdir;

    fn make_email(id: &str) -> CachedEmail {
        CachedEmail::builder(EmailId::new(id), "INBOX")
            .subject("Test")
            .from(Mailbox::new("test@example.com"))
            .build()
    }

    #[test]
    fn test_same_account_shares_partition() {
        let manager = CacheManager::in_memory();
        let a = manager.partition("user@example.com").unwrap();
        let b = manager.partition("user@example.com").unwrap();

        a.put_email(make_email("m1")).unwrap();
        assert!(b.get_email(&EmailId::new("m1")).unwrap().is_some());
    }

    #[test]
    fn test_accounts_are_isolated() {
        let manager = CacheManager::in_memory();
        let a = manager.partition("a@example.com").unwrap();
        let b = manager.partition("b@example.com").unwrap();

        a.put_email(make_email("m1")).unwrap();
        assert!(b.get_email(&EmailId::new("m1")).unwrap().is_none());
    }

    #[test]
    fn test_disk_partitions_are_separate_files() {
        let dir = tempdir().unwrap();
        let manager = CacheManager::new(dir.path());

        manager
            .partition("a@example.com")
            .unwrap()
            .put_email(make_email("m1"))
            .unwrap();
        manager.partition("b@example.com").unwrap();

        assert!(dir.path().join("a_example.com.sqlite").exists());
        assert!(dir.path().join("b_example.com.sqlite").exists());
    }

    #[test]
    fn test_close_all_is_idempotent() {
        let manager = CacheManager::in_memory();
        manager.partition("user@example.com").unwrap();

        manager.close_all();
        manager.close_all();

        assert!(manager.is_closed());
        assert!(manager.partition("user@example.com").is_err());
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("user@example.com"), "user_example.com");
        assert_eq!(sanitize_key("weird key/../x"), "weird_key_.._x");
    }
}
