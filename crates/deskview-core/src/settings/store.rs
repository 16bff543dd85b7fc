//! Settings store

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, info, warn};
use url::Url;

use super::backend::{SettingsBackend, SettingsMap};
use super::schema::{builtin_kind, SettingKind};
use super::url_params::UrlParams;
use super::value::SettingValue;
use crate::errors::{DeskviewError, Result};

/// Background write to the persisted layer
///
/// Failures are logged inside the future; it always resolves to `()`.
pub type PersistFuture = LocalBoxFuture<'static, ()>;

// ----------------------------------------------------------------------------
// Embedding Configuration
// ----------------------------------------------------------------------------

/// Values supplied by the page embedding the viewer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Values that override every other layer and lock the setting
    pub mandatory: SettingsMap,
    /// Defaults that replace the viewer's built-in defaults
    pub defaults: SettingsMap,
    /// Location of the page hosting the viewer
    pub page_url: Option<String>,
}

// ----------------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------------

/// Layer a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingOrigin {
    Mandatory,
    Url,
    Persisted,
    Default,
}

/// A resolved setting as held in the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setting {
    pub name: String,
    pub value: SettingValue,
    pub origin: SettingOrigin,
}

/// Result of [`SettingsStore::write`]
#[must_use]
pub enum WriteOutcome {
    /// Value equals the cached one; nothing to persist
    Unchanged,
    /// Setting is forced or the value is not valid for it
    Refused,
    /// Cache updated; run the future to persist
    Persist(PersistFuture),
}

impl WriteOutcome {
    pub fn accepted(&self) -> bool {
        !matches!(self, WriteOutcome::Refused)
    }

    pub fn into_future(self) -> Option<PersistFuture> {
        match self {
            WriteOutcome::Persist(future) => Some(future),
            _ => None,
        }
    }
}

impl core::fmt::Debug for WriteOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WriteOutcome::Unchanged => write!(f, "Unchanged"),
            WriteOutcome::Refused => write!(f, "Refused"),
            WriteOutcome::Persist(_) => write!(f, "Persist(..)"),
        }
    }
}

// ----------------------------------------------------------------------------
// Settings Store
// ----------------------------------------------------------------------------

/// Resolves settings across layers and persists user edits
pub struct SettingsStore {
    backend: Rc<dyn SettingsBackend>,
    mandatory: SettingsMap,
    embedding_defaults: SettingsMap,
    page_url: Option<Url>,
    url_params: UrlParams,
    persisted: SettingsMap,
    cache: BTreeMap<String, Setting>,
    forced: BTreeSet<String>,
    initialized: bool,
    degraded: bool,
}

impl SettingsStore {
    /// Create a store; nothing is loaded until [`initialize`](Self::initialize)
    pub fn new(backend: Rc<dyn SettingsBackend>, embedding: EmbeddingConfig) -> Result<Self> {
        let page_url = match embedding.page_url.as_deref() {
            Some(raw) => Some(Url::parse(raw).map_err(|e| {
                DeskviewError::config_error(format!("invalid page url {}: {}", raw, e))
            })?),
            None => None,
        };
        let url_params = page_url.as_ref().map(UrlParams::from_url).unwrap_or_default();

        Ok(Self {
            backend,
            mandatory: embedding.mandatory,
            embedding_defaults: embedding.defaults,
            page_url,
            url_params,
            persisted: SettingsMap::new(),
            cache: BTreeMap::new(),
            forced: BTreeSet::new(),
            initialized: false,
            degraded: false,
        })
    }

    /// Load the defaults document and the persisted layer
    ///
    /// Failures are logged and leave the store running on memory only. A
    /// second call does nothing.
    pub async fn initialize(&mut self) {
        if self.initialized {
            debug!("Settings store already initialized");
            return;
        }
        self.initialized = true;

        let backend = Rc::clone(&self.backend);
        let mut loaded = SettingsMap::new();

        match backend.load_defaults().await {
            Ok(defaults) => loaded.extend(defaults),
            Err(e) => warn!(
                backend = backend.describe(),
                "Could not load settings defaults: {}",
                e
            ),
        }

        match backend.load_persisted().await {
            Ok(values) => loaded.extend(values),
            Err(e) => {
                warn!(
                    backend = backend.describe(),
                    "Could not load persisted settings, continuing in memory: {}", e
                );
                self.degraded = true;
            }
        }

        for (name, value) in &loaded {
            self.cache.insert(
                name.clone(),
                Setting {
                    name: name.clone(),
                    value: value.clone(),
                    origin: SettingOrigin::Persisted,
                },
            );
        }
        info!(
            backend = backend.describe(),
            count = loaded.len(),
            "Settings initialized"
        );
        self.persisted = loaded;
    }

    /// Resolve the effective value of a setting
    ///
    /// The winning value is written into the cache. Names present in the
    /// mandatory set become forced. Returns `None` when no layer matches and
    /// no default exists.
    pub fn resolve(&mut self, name: &str, default: Option<SettingValue>) -> Option<SettingValue> {
        let kind = builtin_kind(name);
        if self.mandatory.contains_key(name) && self.forced.insert(name.to_string()) {
            debug!(setting = name, "Setting forced by embedding configuration");
        }

        let candidates = [
            (SettingOrigin::Mandatory, self.mandatory.get(name).cloned()),
            (
                SettingOrigin::Url,
                self.url_params.lookup(name).map(SettingValue::from),
            ),
            (SettingOrigin::Persisted, self.persisted.get(name).cloned()),
            (
                SettingOrigin::Default,
                self.embedding_defaults.get(name).cloned().or(default),
            ),
        ];

        for (origin, candidate) in candidates {
            let Some(raw) = candidate else { continue };
            match normalize(kind, raw) {
                Some(value) => {
                    self.cache.insert(
                        name.to_string(),
                        Setting {
                            name: name.to_string(),
                            value: value.clone(),
                            origin,
                        },
                    );
                    return Some(value);
                }
                None => warn!(setting = name, ?origin, "Ignoring invalid setting value"),
            }
        }

        self.cache.remove(name);
        None
    }

    /// Update a setting from user interaction
    ///
    /// Forced settings are refused. Writing the cached value again skips
    /// persistence.
    pub fn write(&mut self, name: &str, value: SettingValue) -> WriteOutcome {
        if self.forced.contains(name) {
            warn!(setting = name, "Refusing to change a forced setting");
            return WriteOutcome::Refused;
        }
        let Some(value) = normalize(builtin_kind(name), value) else {
            warn!(setting = name, "Refusing invalid setting value");
            return WriteOutcome::Refused;
        };
        if self.read(name).as_ref() == Some(&value) {
            return WriteOutcome::Unchanged;
        }

        debug!(setting = name, "Setting changed");
        self.persisted.insert(name.to_string(), value.clone());
        self.cache.insert(
            name.to_string(),
            Setting {
                name: name.to_string(),
                value: value.clone(),
                origin: SettingOrigin::Persisted,
            },
        );

        let backend = Rc::clone(&self.backend);
        let name = name.to_string();
        WriteOutcome::Persist(Box::pin(async move {
            if let Err(e) = backend.store(&name, &value).await {
                warn!(
                    backend = backend.describe(),
                    setting = %name,
                    "Could not persist setting: {}",
                    e
                );
            }
        }))
    }

    /// Write and wait for persistence; returns whether the write was accepted
    pub async fn write_and_persist(&mut self, name: &str, value: SettingValue) -> bool {
        match self.write(name, value) {
            WriteOutcome::Persist(future) => {
                future.await;
                true
            }
            WriteOutcome::Unchanged => true,
            WriteOutcome::Refused => false,
        }
    }

    /// Remove a setting from the cache and the persisted layer
    ///
    /// Returns `None` for forced settings, which cannot be erased.
    pub fn erase(&mut self, name: &str) -> Option<PersistFuture> {
        if self.forced.contains(name) {
            warn!(setting = name, "Refusing to erase a forced setting");
            return None;
        }
        self.cache.remove(name);
        self.persisted.remove(name);

        let backend = Rc::clone(&self.backend);
        let name = name.to_string();
        Some(Box::pin(async move {
            if let Err(e) = backend.erase(&name).await {
                warn!(
                    backend = backend.describe(),
                    setting = %name,
                    "Could not erase setting: {}",
                    e
                );
            }
        }))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Cached value, without side effects
    pub fn read(&self, name: &str) -> Option<SettingValue> {
        self.cache.get(name).map(|setting| setting.value.clone())
    }

    pub fn read_setting(&self, name: &str) -> Option<&Setting> {
        self.cache.get(name)
    }

    pub fn read_bool(&self, name: &str) -> Option<bool> {
        self.cache.get(name).map(|setting| setting.value.coerce_bool())
    }

    pub fn read_number(&self, name: &str) -> Option<f64> {
        self.cache.get(name).and_then(|setting| setting.value.as_number())
    }

    /// Cached value as text; empty text reads as `None`
    pub fn read_text(&self, name: &str) -> Option<String> {
        self.cache
            .get(name)
            .map(|setting| setting.value.as_text())
            .filter(|text| !text.is_empty())
    }

    pub fn is_forced(&self, name: &str) -> bool {
        self.forced.contains(name)
    }

    pub fn forced(&self) -> impl Iterator<Item = &str> {
        self.forced.iter().map(String::as_str)
    }

    pub fn settings(&self) -> impl Iterator<Item = &Setting> {
        self.cache.values()
    }

    pub fn page_url(&self) -> Option<&Url> {
        self.page_url.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the persisted layer failed to load
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

impl core::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("backend", &self.backend.describe())
            .field("page_url", &self.page_url)
            .field("cached", &self.cache.len())
            .field("forced", &self.forced)
            .field("initialized", &self.initialized)
            .field("degraded", &self.degraded)
            .finish()
    }
}

fn normalize(kind: Option<SettingKind>, value: SettingValue) -> Option<SettingValue> {
    match kind {
        Some(kind) => kind.normalize(value),
        None => Some(value),
    }
}
