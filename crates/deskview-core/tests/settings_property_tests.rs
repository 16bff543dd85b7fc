//! Property-based tests for settings resolution and persistence
//!
//! These verify that layer precedence holds for arbitrary names and values
//! and that repeated identical writes never reach storage twice.

use deskview_core::{
    EmbeddingConfig, MemoryBackend, SettingOrigin, SettingValue, SettingsMap, SettingsStore,
};
use futures::executor::block_on;
use proptest::prelude::*;
use std::rc::Rc;

/// Setting names outside the built-in schema, so values stay untyped text
fn arb_name() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"x_[a-z]{1,8}").unwrap()
}

/// URL-safe values
fn arb_value() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-zA-Z0-9]{1,12}").unwrap()
}

fn single(name: &str, value: &str) -> SettingsMap {
    [(name.to_string(), SettingValue::from(value))]
        .into_iter()
        .collect()
}

fn store(
    backend: Rc<MemoryBackend>,
    mandatory: Option<&str>,
    name: &str,
    url_value: Option<&str>,
    in_query: bool,
) -> SettingsStore {
    let page_url = match (url_value, in_query) {
        (Some(v), true) => format!("https://viewer.example/vnc.html?{}={}", name, v),
        (Some(v), false) => format!("https://viewer.example/vnc.html#{}={}", name, v),
        (None, _) => "https://viewer.example/vnc.html".to_string(),
    };
    let embedding = EmbeddingConfig {
        mandatory: mandatory.map(|v| single(name, v)).unwrap_or_default(),
        defaults: SettingsMap::new(),
        page_url: Some(page_url),
    };
    let mut store = SettingsStore::new(backend, embedding).expect("valid embedding");
    block_on(store.initialize());
    store
}

proptest! {
    /// Property: a mandatory value wins over every other layer and locks the setting
    #[test]
    fn mandatory_always_wins(
        name in arb_name(),
        mandatory in arb_value(),
        url_value in proptest::option::of(arb_value()),
        persisted in proptest::option::of(arb_value()),
        in_query in any::<bool>(),
        default in arb_value(),
    ) {
        let backend = Rc::new(
            MemoryBackend::new()
                .with_persisted(persisted.as_deref().map(|v| single(&name, v)).unwrap_or_default()),
        );
        let mut store = store(backend, Some(&mandatory), &name, url_value.as_deref(), in_query);

        let resolved = store.resolve(&name, Some(SettingValue::from(default.as_str())));
        prop_assert_eq!(resolved, Some(SettingValue::from(mandatory.as_str())));
        prop_assert!(store.is_forced(&name));
        prop_assert_eq!(store.read_setting(&name).unwrap().origin, SettingOrigin::Mandatory);
        prop_assert!(!block_on(store.write_and_persist(&name, SettingValue::from("changed"))));
    }

    /// Property: without a mandatory value the URL beats persisted storage,
    /// which beats the caller default
    #[test]
    fn url_then_persisted_then_default(
        name in arb_name(),
        url_value in proptest::option::of(arb_value()),
        persisted in proptest::option::of(arb_value()),
        in_query in any::<bool>(),
        default in arb_value(),
    ) {
        let backend = Rc::new(
            MemoryBackend::new()
                .with_persisted(persisted.as_deref().map(|v| single(&name, v)).unwrap_or_default()),
        );
        let mut store = store(backend, None, &name, url_value.as_deref(), in_query);

        let expected = url_value
            .clone()
            .or_else(|| persisted.clone())
            .unwrap_or_else(|| default.clone());
        let resolved = store.resolve(&name, Some(SettingValue::from(default.as_str())));
        prop_assert_eq!(resolved, Some(SettingValue::from(expected)));
        prop_assert!(!store.is_forced(&name));
    }

    /// Property: writing the same value any number of times stores it once
    #[test]
    fn identical_writes_store_once(
        name in arb_name(),
        value in arb_value(),
        repeats in 1usize..8,
    ) {
        let backend = Rc::new(MemoryBackend::new());
        let mut store = store(Rc::clone(&backend), None, &name, None, false);

        for _ in 0..repeats {
            prop_assert!(block_on(
                store.write_and_persist(&name, SettingValue::from(value.as_str()))
            ));
        }
        prop_assert_eq!(backend.write_count(), 1);
        prop_assert_eq!(store.read(&name), Some(SettingValue::from(value.as_str())));
    }
}
