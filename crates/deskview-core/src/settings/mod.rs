//! Layered settings resolution and persistence
//!
//! A setting's effective value comes from, highest first: the embedding
//! page's mandatory values, the page URL fragment, the page URL query, the
//! persisted layer, then a default. See [`SettingsStore::resolve`].

pub mod backend;
pub mod schema;
pub mod store;
pub mod url_params;
pub mod value;

pub use backend::{MemoryBackend, SettingsBackend, SettingsMap};
pub use schema::{
    builtin_default, builtin_kind, names, SettingKind, SettingSpec, BUILTIN_SETTINGS,
};
pub use store::{
    EmbeddingConfig, PersistFuture, Setting, SettingOrigin, SettingsStore, WriteOutcome,
};
pub use url_params::UrlParams;
pub use value::SettingValue;
