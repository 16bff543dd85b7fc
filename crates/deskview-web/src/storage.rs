//! Browser settings backend
//!
//! Defaults come from the `defaults.json` document served beside the viewer.
//! Persisted settings live in `chrome.storage.sync` when running as an
//! extension and in `localStorage` otherwise.

use async_trait::async_trait;
use deskview_core::{SettingValue, SettingsBackend, SettingsError, SettingsMap};
use js_sys::{Object, Promise, Reflect};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::utils::{js_error_text, window};

pub const DEFAULTS_DOCUMENT: &str = "./defaults.json";

enum StorageArea {
    /// `chrome.storage.sync`
    Extension(JsValue),
    Local(web_sys::Storage),
    Unavailable,
}

/// [`SettingsBackend`] over browser storage
pub struct LocalStorageBackend {
    defaults_url: String,
    area: StorageArea,
}

impl LocalStorageBackend {
    /// Pick extension storage when present, else `localStorage`
    pub fn detect(defaults_url: impl Into<String>) -> Self {
        Self {
            defaults_url: defaults_url.into(),
            area: detect_area(),
        }
    }

    fn storage_call(&self, method: &str, argument: &JsValue) -> Result<Promise, String> {
        let StorageArea::Extension(sync) = &self.area else {
            return Err("extension storage not in use".to_string());
        };
        let function = Reflect::get(sync, &JsValue::from_str(method))
            .map_err(|e| js_error_text(&e))?
            .dyn_into::<js_sys::Function>()
            .map_err(|_| format!("chrome.storage.sync.{} is not a function", method))?;
        // The callback form works in every extension manifest version
        Ok(Promise::new(&mut |resolve, _reject| {
            if let Err(e) = function.call2(sync, argument, &resolve) {
                warn!(error = %js_error_text(&e), "Extension storage call failed");
            }
        }))
    }
}

fn detect_area() -> StorageArea {
    let Ok(window) = window() else {
        return StorageArea::Unavailable;
    };
    let sync = Reflect::get(&window, &JsValue::from_str("chrome"))
        .and_then(|chrome| Reflect::get(&chrome, &JsValue::from_str("storage")))
        .and_then(|storage| Reflect::get(&storage, &JsValue::from_str("sync")));
    if let Ok(sync) = sync {
        if sync.is_object() {
            return StorageArea::Extension(sync);
        }
    }
    match window.local_storage() {
        Ok(Some(storage)) => StorageArea::Local(storage),
        Ok(None) => StorageArea::Unavailable,
        Err(e) => {
            warn!(error = %js_error_text(&e), "localStorage is not accessible");
            StorageArea::Unavailable
        }
    }
}

#[async_trait(?Send)]
impl SettingsBackend for LocalStorageBackend {
    async fn load_defaults(&self) -> Result<SettingsMap, SettingsError> {
        let failed = |reason: String| SettingsError::Defaults { reason };
        let window = window().map_err(|e| failed(js_error_text(&e)))?;
        let response = JsFuture::from(window.fetch_with_str(&self.defaults_url))
            .await
            .map_err(|e| failed(js_error_text(&e)))?;
        let response: web_sys::Response = response
            .dyn_into()
            .map_err(|_| failed("fetch did not return a Response".to_string()))?;
        if !response.ok() {
            return Err(failed(format!(
                "{} answered {}",
                self.defaults_url,
                response.status()
            )));
        }
        let json = response.json().map_err(|e| failed(js_error_text(&e)))?;
        let json = JsFuture::from(json)
            .await
            .map_err(|e| failed(js_error_text(&e)))?;
        let defaults: SettingsMap =
            serde_wasm_bindgen::from_value(json).map_err(|e| failed(e.to_string()))?;
        debug!(count = defaults.len(), "Loaded defaults document");
        Ok(defaults)
    }

    async fn load_persisted(&self) -> Result<SettingsMap, SettingsError> {
        let failed = |reason: String| SettingsError::StorageRead { reason };
        match &self.area {
            StorageArea::Extension(_) => {
                let promise = self.storage_call("get", &JsValue::NULL).map_err(failed)?;
                let items = JsFuture::from(promise)
                    .await
                    .map_err(|e| failed(js_error_text(&e)))?;
                serde_wasm_bindgen::from_value(items).map_err(|e| failed(e.to_string()))
            }
            StorageArea::Local(storage) => {
                let mut settings = SettingsMap::new();
                let length = storage.length().map_err(|e| failed(js_error_text(&e)))?;
                for index in 0..length {
                    let Ok(Some(key)) = storage.key(index) else {
                        continue;
                    };
                    match storage.get_item(&key) {
                        Ok(Some(value)) => {
                            settings.insert(key, SettingValue::Text(value));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(%key, error = %js_error_text(&e), "Could not read setting")
                        }
                    }
                }
                Ok(settings)
            }
            StorageArea::Unavailable => Err(failed("no browser storage".to_string())),
        }
    }

    async fn store(&self, name: &str, value: &SettingValue) -> Result<(), SettingsError> {
        let failed = |reason: String| SettingsError::StorageWrite {
            name: name.to_string(),
            reason,
        };
        match &self.area {
            StorageArea::Extension(_) => {
                let item = Object::new();
                let js_value =
                    serde_wasm_bindgen::to_value(value).map_err(|e| failed(e.to_string()))?;
                Reflect::set(&item, &JsValue::from_str(name), &js_value)
                    .map_err(|e| failed(js_error_text(&e)))?;
                let promise = self.storage_call("set", &item).map_err(failed)?;
                JsFuture::from(promise)
                    .await
                    .map(|_| ())
                    .map_err(|e| failed(js_error_text(&e)))
            }
            StorageArea::Local(storage) => storage
                .set_item(name, &value.to_string())
                .map_err(|e| failed(js_error_text(&e))),
            StorageArea::Unavailable => Err(failed("no browser storage".to_string())),
        }
    }

    async fn erase(&self, name: &str) -> Result<(), SettingsError> {
        let failed = |reason: String| SettingsError::StorageErase {
            name: name.to_string(),
            reason,
        };
        match &self.area {
            StorageArea::Extension(_) => {
                let promise = self
                    .storage_call("remove", &JsValue::from_str(name))
                    .map_err(failed)?;
                JsFuture::from(promise)
                    .await
                    .map(|_| ())
                    .map_err(|e| failed(js_error_text(&e)))
            }
            StorageArea::Local(storage) => storage
                .remove_item(name)
                .map_err(|e| failed(js_error_text(&e))),
            StorageArea::Unavailable => Err(failed("no browser storage".to_string())),
        }
    }

    fn describe(&self) -> &'static str {
        match self.area {
            StorageArea::Extension(_) => "chrome-storage-sync",
            StorageArea::Local(_) => "local-storage",
            StorageArea::Unavailable => "unavailable",
        }
    }
}
