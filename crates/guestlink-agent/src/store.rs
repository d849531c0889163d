//! Key/value exchange store abstraction
//!
//! The host and guest exchange data through two one-directional pools of
//! named string entries. The real pools live in a platform facility owned
//! by the hypervisor integration; this module defines the access contract
//! plus an in-memory implementation used for local runs and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::Notify;

/// Which of the two exchange pools an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreLocation {
    /// Entries written by the host for the guest to read
    FromHost,
    /// Entries written by the guest for the host to read
    ToHost,
}

/// Errors surfaced by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying store rejected or failed the operation
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Access contract for the exchange store.
///
/// Implementations must be safe to share across tasks. Mutations to a
/// location must signal that location's notifier so waiting readers
/// re-scan; the notifier stores a permit when nobody is waiting, so a
/// change between scans is never lost.
pub trait KvStore: Send + Sync {
    /// Entry names currently present at a location.
    fn keys(&self, location: StoreLocation) -> Result<Vec<String>, StoreError>;

    /// Read one entry's value, `None` if the entry is absent.
    fn read(&self, location: StoreLocation, name: &str) -> Result<Option<String>, StoreError>;

    /// Create or overwrite an entry.
    fn write(&self, location: StoreLocation, name: &str, value: &str) -> Result<(), StoreError>;

    /// Delete an entry. Deleting an absent entry is not an error.
    fn delete(&self, location: StoreLocation, name: &str) -> Result<(), StoreError>;

    /// Change notifier for a location.
    fn notifier(&self, location: StoreLocation) -> Arc<Notify>;
}

/// In-memory store with the same signalling semantics as the platform one.
pub struct MemoryStore {
    from_host: Mutex<BTreeMap<String, String>>,
    to_host: Mutex<BTreeMap<String, String>>,
    from_host_notify: Arc<Notify>,
    to_host_notify: Arc<Notify>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            from_host: Mutex::new(BTreeMap::new()),
            to_host: Mutex::new(BTreeMap::new()),
            from_host_notify: Arc::new(Notify::new()),
            to_host_notify: Arc::new(Notify::new()),
        }
    }

    fn pool(&self, location: StoreLocation) -> &Mutex<BTreeMap<String, String>> {
        match location {
            StoreLocation::FromHost => &self.from_host,
            StoreLocation::ToHost => &self.to_host,
        }
    }

    fn lock(
        &self,
        location: StoreLocation,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.pool(location)
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn keys(&self, location: StoreLocation) -> Result<Vec<String>, StoreError> {
        Ok(self.lock(location)?.keys().cloned().collect())
    }

    fn read(&self, location: StoreLocation, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock(location)?.get(name).cloned())
    }

    fn write(&self, location: StoreLocation, name: &str, value: &str) -> Result<(), StoreError> {
        self.lock(location)?
            .insert(name.to_string(), value.to_string());
        self.notifier(location).notify_one();
        Ok(())
    }

    fn delete(&self, location: StoreLocation, name: &str) -> Result<(), StoreError> {
        self.lock(location)?.remove(name);
        self.notifier(location).notify_one();
        Ok(())
    }

    fn notifier(&self, location: StoreLocation) -> Arc<Notify> {
        match location {
            StoreLocation::FromHost => Arc::clone(&self.from_host_notify),
            StoreLocation::ToHost => Arc::clone(&self.to_host_notify),
        }
    }
}
