//! Deskview Web Application - Composition Root
//!
//! This module implements the main application class for WebAssembly:
//! 1. Loading settings and building the connection controller
//! 2. Pumping controller inputs raised by timers, probes and RFB events
//! 3. Exposing user operations as `#[wasm_bindgen]` methods
//! 4. Forwarding every app event to one JavaScript callback

use deskview_core::{
    input_channel, names, AppEvent, ConnectionController, CredentialKind, EmbeddingConfig,
    InputReceiver, SessionControlConfig, SettingValue, SettingsStore,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::host::WebHost;
use crate::session::RfbSessionFactory;
use crate::storage::{LocalStorageBackend, DEFAULTS_DOCUMENT};
use crate::utils::{init_logging, js_error_text, to_js_error, window};

// ----------------------------------------------------------------------------
// JavaScript Interop Types
// ----------------------------------------------------------------------------

/// Options accepted by [`DeskviewWebApp::create`]
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsAppOptions {
    /// Id of the element the remote screen renders into
    pub container_id: Option<String>,
    /// Location of the bundled defaults document
    pub defaults_url: Option<String>,
    pub config: SessionControlConfig,
    /// Values that override everything and lock their controls
    pub mandatory: deskview_core::SettingsMap,
    /// Embedding defaults that replace the built-in ones
    pub defaults: deskview_core::SettingsMap,
}

/// JavaScript-compatible app event
pub struct JsAppEvent {
    pub event_type: String,
    pub data: JsValue,
}

impl From<AppEvent> for JsAppEvent {
    fn from(event: AppEvent) -> Self {
        Self {
            event_type: event_type(&event).to_string(),
            data: serde_wasm_bindgen::to_value(&event).unwrap_or(JsValue::NULL),
        }
    }
}

/// Name under which an event is delivered to JavaScript
pub fn event_type(event: &AppEvent) -> &'static str {
    event.kind()
}

pub fn parse_credential_kind(kind: &str) -> Option<CredentialKind> {
    match kind.to_ascii_lowercase().as_str() {
        "username" => Some(CredentialKind::Username),
        "password" => Some(CredentialKind::Password),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Deskview Web Application
// ----------------------------------------------------------------------------

struct AppInner {
    controller: ConnectionController<WebHost>,
    callback: Option<js_sys::Function>,
}

type SharedApp = Rc<RefCell<AppInner>>;

/// Main deskview application exposed to the view layer
#[wasm_bindgen]
pub struct DeskviewWebApp {
    inner: SharedApp,
}

#[wasm_bindgen]
impl DeskviewWebApp {
    /// Load settings and build the controller
    ///
    /// `options` is an optional object matching [`JsAppOptions`].
    pub async fn create(options: JsValue) -> Result<DeskviewWebApp, JsValue> {
        let options: JsAppOptions = if options.is_undefined() || options.is_null() {
            JsAppOptions::default()
        } else {
            serde_wasm_bindgen::from_value(options).map_err(to_js_error)?
        };

        let page_url = window()?.location().href()?;
        let backend = LocalStorageBackend::detect(
            options
                .defaults_url
                .as_deref()
                .unwrap_or(DEFAULTS_DOCUMENT),
        );
        let embedding = EmbeddingConfig {
            mandatory: options.mandatory,
            defaults: options.defaults,
            page_url: Some(page_url),
        };
        let mut settings = SettingsStore::new(Rc::new(backend), embedding).map_err(to_js_error)?;
        settings.initialize().await;

        let factory = RfbSessionFactory::for_element_id(
            options.container_id.as_deref().unwrap_or("deskview_container"),
        )?;
        let (inputs_tx, inputs_rx) = input_channel();
        let host = WebHost::new(inputs_tx.clone())?;
        let controller =
            ConnectionController::new(options.config, settings, Box::new(factory), host, inputs_tx);

        let inner = Rc::new(RefCell::new(AppInner {
            controller,
            callback: None,
        }));
        spawn_local(pump_inputs(Rc::downgrade(&inner), inputs_rx));
        Ok(DeskviewWebApp { inner })
    }

    /// Register the callback receiving `(event_type, data)` for every event
    pub fn on_event(&self, callback: js_sys::Function) {
        self.inner.borrow_mut().callback = Some(callback);
    }

    /// Resolve settings, then autoconnect or ask for the connect panel
    pub fn start(&self) -> Result<(), JsValue> {
        self.run(|controller| {
            let result = controller.start();
            init_logging(controller.log_level());
            result
        })
        .map_err(to_js_error)
    }

    pub fn connect(&self) -> Result<(), JsValue> {
        self.run(|controller| controller.connect()).map_err(to_js_error)
    }

    pub fn disconnect(&self) {
        self.run(|controller| controller.disconnect())
    }

    pub fn cancel_reconnect(&self) {
        self.run(|controller| controller.cancel_reconnect())
    }

    pub fn approve_server(&self) -> Result<(), JsValue> {
        self.run(|controller| controller.approve_server())
            .map_err(to_js_error)
    }

    pub fn reject_server(&self) -> Result<(), JsValue> {
        self.run(|controller| controller.reject_server())
            .map_err(to_js_error)
    }

    /// Update a credential prompt field (`"username"` or `"password"`)
    pub fn set_credential(&self, kind: &str, value: &str) -> Result<(), JsValue> {
        let kind = parse_credential_kind(kind)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown credential field {}", kind)))?;
        self.run(|controller| controller.set_credential(kind, value))
            .map_err(to_js_error)
    }

    pub fn submit_credentials(&self) -> Result<(), JsValue> {
        self.run(|controller| controller.submit_credentials())
            .map_err(to_js_error)
    }

    pub fn hide_status(&self) {
        self.run(|controller| controller.hide_status())
    }

    /// Change a setting; returns `false` when it is forced or invalid
    pub fn write_setting(&self, name: &str, value: JsValue) -> Result<bool, JsValue> {
        let value: SettingValue = serde_wasm_bindgen::from_value(value).map_err(to_js_error)?;
        Ok(self.run(|controller| controller.write_setting(name, value)))
    }

    pub fn erase_setting(&self, name: &str) -> bool {
        self.run(|controller| controller.erase_setting(name))
    }

    pub fn read_setting(&self, name: &str) -> JsValue {
        let value = self.inner.borrow().controller.read_setting(name);
        serde_wasm_bindgen::to_value(&value).unwrap_or(JsValue::NULL)
    }

    pub fn is_setting_forced(&self, name: &str) -> bool {
        self.inner.borrow().controller.settings().is_forced(name)
    }

    pub fn state(&self) -> String {
        self.inner.borrow().controller.state().to_string()
    }

    /// Latest published latency, `"--"` when unavailable
    pub fn latency(&self) -> String {
        self.inner.borrow().controller.latency().to_string()
    }

    pub fn quality(&self) -> JsValue {
        let quality = self.inner.borrow().controller.quality();
        serde_wasm_bindgen::to_value(&quality).unwrap_or(JsValue::NULL)
    }

    pub fn title(&self) -> String {
        self.inner.borrow().controller.title()
    }

    pub fn log_level(&self) -> String {
        self.inner.borrow().controller.log_level().as_str().to_string()
    }

    /// Whether a reconnect will be attempted after an unclean close
    pub fn reconnect_enabled(&self) -> bool {
        self.inner
            .borrow()
            .controller
            .settings()
            .read_bool(names::RECONNECT)
            .unwrap_or(false)
    }
}

impl DeskviewWebApp {
    /// Run an operation, then deliver the events it produced
    fn run<T>(&self, operation: impl FnOnce(&mut ConnectionController<WebHost>) -> T) -> T {
        run_on(&self.inner, operation)
    }
}

fn run_on<T>(
    inner: &SharedApp,
    operation: impl FnOnce(&mut ConnectionController<WebHost>) -> T,
) -> T {
    let (result, events, callback) = {
        let mut app = inner.borrow_mut();
        let result = operation(&mut app.controller);
        let events = app.controller.drain_events();
        (result, events, app.callback.clone())
    };
    // Borrow released: the callback may call back into the app
    deliver(callback.as_ref(), events);
    result
}

fn deliver(callback: Option<&js_sys::Function>, events: Vec<AppEvent>) {
    let Some(callback) = callback else {
        return;
    };
    for event in events {
        let event = JsAppEvent::from(event);
        if let Err(e) = callback.call2(
            &JsValue::NULL,
            &JsValue::from_str(&event.event_type),
            &event.data,
        ) {
            warn!(event = %event.event_type, error = %js_error_text(&e), "Event callback threw");
        }
    }
}

async fn pump_inputs(app: Weak<RefCell<AppInner>>, mut inputs: InputReceiver) {
    while let Some(input) = inputs.next().await {
        let Some(inner) = app.upgrade() else {
            break;
        };
        run_on(&inner, |controller| controller.handle(input));
    }
    info!("Controller input pump stopped");
}
