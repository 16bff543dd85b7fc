//! Persistence backends for the settings store

use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use super::value::SettingValue;
use crate::errors::SettingsError;

/// Flat name to value namespace
pub type SettingsMap = BTreeMap<String, SettingValue>;

/// Storage consulted by [`SettingsStore`](super::SettingsStore)
///
/// Loading happens once at startup: the bundled defaults document first,
/// then whatever the platform persisted. Writes and erases go back to the
/// persisted layer.
#[async_trait(?Send)]
pub trait SettingsBackend {
    /// Bundled defaults document shipped with the viewer
    async fn load_defaults(&self) -> Result<SettingsMap, SettingsError>;

    /// Every persisted key, enumerated rather than read selectively
    async fn load_persisted(&self) -> Result<SettingsMap, SettingsError>;

    async fn store(&self, name: &str, value: &SettingValue) -> Result<(), SettingsError>;

    async fn erase(&self, name: &str) -> Result<(), SettingsError>;

    /// Short label used in log output
    fn describe(&self) -> &'static str;
}

// ----------------------------------------------------------------------------
// In-memory Backend
// ----------------------------------------------------------------------------

/// Backend that keeps everything in memory
///
/// Used when no platform storage exists and by tests, which can inject
/// failures and count writes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    defaults: SettingsMap,
    persisted: RefCell<SettingsMap>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    writes: Cell<usize>,
    erases: Cell<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self, defaults: SettingsMap) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_persisted(self, persisted: SettingsMap) -> Self {
        *self.persisted.borrow_mut() = persisted;
        self
    }

    /// Make every load fail
    pub fn failing_reads(self) -> Self {
        self.fail_reads.set(true);
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Number of successful `store` calls
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn erase_count(&self) -> usize {
        self.erases.get()
    }

    pub fn stored(&self, name: &str) -> Option<SettingValue> {
        self.persisted.borrow().get(name).cloned()
    }
}

#[async_trait(?Send)]
impl SettingsBackend for MemoryBackend {
    async fn load_defaults(&self) -> Result<SettingsMap, SettingsError> {
        if self.fail_reads.get() {
            return Err(SettingsError::Defaults {
                reason: "defaults unavailable".to_string(),
            });
        }
        Ok(self.defaults.clone())
    }

    async fn load_persisted(&self) -> Result<SettingsMap, SettingsError> {
        if self.fail_reads.get() {
            return Err(SettingsError::StorageRead {
                reason: "storage unavailable".to_string(),
            });
        }
        Ok(self.persisted.borrow().clone())
    }

    async fn store(&self, name: &str, value: &SettingValue) -> Result<(), SettingsError> {
        if self.fail_writes.get() {
            return Err(SettingsError::StorageWrite {
                name: name.to_string(),
                reason: "storage unavailable".to_string(),
            });
        }
        self.persisted
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    async fn erase(&self, name: &str) -> Result<(), SettingsError> {
        if self.fail_writes.get() {
            return Err(SettingsError::StorageErase {
                name: name.to_string(),
                reason: "storage unavailable".to_string(),
            });
        }
        self.persisted.borrow_mut().remove(name);
        self.erases.set(self.erases.get() + 1);
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}
