//! Utility functions for WASM module

use deskview_core::LogLevel;
use std::sync::Once;
use wasm_bindgen::prelude::*;

static LOGGING: Once = Once::new();

/// Set up better panic messages in debug mode
pub fn set_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Route `tracing` output to the browser console
///
/// Only the first call installs the subscriber; its level stays fixed for the
/// lifetime of the page.
pub fn init_logging(level: LogLevel) {
    LOGGING.call_once(|| {
        let config = tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(level.to_level())
            .build();
        tracing_wasm::set_as_global_default_with_config(config);
    });
}

pub(crate) fn window() -> Result<web_sys::Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))
}

/// Readable text for a thrown JavaScript value
pub(crate) fn js_error_text(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{:?}", value)
}

pub(crate) fn to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}
