//! JSON file settings backend
//!
//! Persisted settings live in one flat JSON object. The bundled defaults
//! document is a second, read-only JSON object next to the viewer assets.

use async_trait::async_trait;
use deskview_core::{SettingValue, SettingsBackend, SettingsError, SettingsMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const APP_DIR: &str = "deskview";
const SETTINGS_FILE: &str = "settings.json";

/// [`SettingsBackend`] that keeps persisted settings in a JSON file
pub struct JsonFileBackend {
    path: PathBuf,
    defaults_path: Option<PathBuf>,
    // Serializes read-modify-write cycles from concurrently spawned writes
    contents: Mutex<Option<SettingsMap>>,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            defaults_path: None,
            contents: Mutex::new(None),
        }
    }

    /// Backend at the platform configuration directory, if one exists
    pub fn default_location() -> Option<Self> {
        Self::default_path().map(Self::new)
    }

    pub fn default_path() -> Option<PathBuf> {
        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))] {
                dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
            } else {
                dirs::home_dir().map(|dir| dir.join(format!(".{}", APP_DIR)).join(SETTINGS_FILE))
            }
        }
    }

    /// Read bundled defaults from the given document
    pub fn with_defaults_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.defaults_path = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(path: &Path) -> Result<Option<SettingsMap>, String> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| format!("{}: {}", path.display(), e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("{}: {}", path.display(), e)),
        }
    }

    async fn write_map(&self, map: &SettingsMap) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("{}: {}", parent.display(), e))?;
        }
        let json = serde_json::to_vec_pretty(map).map_err(|e| e.to_string())?;
        // Write beside the target then rename so a crash never leaves half a file
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| format!("{}: {}", staging.display(), e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| format!("{}: {}", self.path.display(), e))
    }

    /// Current file contents, loaded on first use
    async fn cached<'a>(
        &self,
        guard: &'a mut Option<SettingsMap>,
    ) -> Result<&'a mut SettingsMap, String> {
        if guard.is_none() {
            *guard = Some(Self::read_map(&self.path).await?.unwrap_or_default());
        }
        Ok(guard.get_or_insert_with(SettingsMap::new))
    }
}

#[async_trait(?Send)]
impl SettingsBackend for JsonFileBackend {
    async fn load_defaults(&self) -> Result<SettingsMap, SettingsError> {
        let Some(path) = &self.defaults_path else {
            return Ok(SettingsMap::new());
        };
        match Self::read_map(path).await {
            Ok(Some(map)) => {
                debug!(path = %path.display(), count = map.len(), "Loaded defaults document");
                Ok(map)
            }
            Ok(None) => Err(SettingsError::Defaults {
                reason: format!("{} not found", path.display()),
            }),
            Err(reason) => Err(SettingsError::Defaults { reason }),
        }
    }

    async fn load_persisted(&self) -> Result<SettingsMap, SettingsError> {
        let mut guard = self.contents.lock().await;
        let map = match Self::read_map(&self.path).await {
            Ok(Some(map)) => map,
            Ok(None) => {
                info!(path = %self.path.display(), "No settings file yet");
                SettingsMap::new()
            }
            Err(reason) => return Err(SettingsError::StorageRead { reason }),
        };
        *guard = Some(map.clone());
        Ok(map)
    }

    async fn store(&self, name: &str, value: &SettingValue) -> Result<(), SettingsError> {
        let mut guard = self.contents.lock().await;
        let failed = |reason: String| SettingsError::StorageWrite {
            name: name.to_string(),
            reason,
        };
        let map = self.cached(&mut *guard).await.map_err(failed)?;
        map.insert(name.to_string(), value.clone());
        let snapshot = map.clone();
        self.write_map(&snapshot).await.map_err(failed)
    }

    async fn erase(&self, name: &str) -> Result<(), SettingsError> {
        let mut guard = self.contents.lock().await;
        let failed = |reason: String| SettingsError::StorageErase {
            name: name.to_string(),
            reason,
        };
        let map = self.cached(&mut *guard).await.map_err(failed)?;
        if map.remove(name).is_none() {
            return Ok(());
        }
        let snapshot = map.clone();
        if let Err(reason) = self.write_map(&snapshot).await {
            warn!(name, %reason, "Settings file not updated after erase");
            return Err(failed(reason));
        }
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "json-file"
    }
}

impl std::fmt::Debug for JsonFileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileBackend")
            .field("path", &self.path)
            .field("defaults_path", &self.defaults_path)
            .finish()
    }
}
