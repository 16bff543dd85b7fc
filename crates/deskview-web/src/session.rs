//! Session adapter over the page's JavaScript `RFB` class
//!
//! The viewer page is expected to expose the remote-framebuffer client as a
//! global `RFB` constructor. Its DOM-style events are translated into
//! [`SessionEvent`]s and delivered through the session's event sink.

use deskview_core::{
    CredentialKinds, Credentials, ProbeError, ProbeFuture, ResizeMode, Session, SessionError,
    SessionEvent, SessionEventSink, SessionFactory, SessionOptions,
};
use instant::Instant;
use js_sys::{Reflect, Uint8Array};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::utils::{js_error_text, window};

#[wasm_bindgen]
extern "C" {
    /// Remote-framebuffer client provided by the page
    #[wasm_bindgen(js_name = RFB)]
    pub type Rfb;

    #[wasm_bindgen(constructor, js_class = "RFB", catch)]
    fn new(target: &web_sys::Element, url: &str, options: &JsValue) -> Result<Rfb, JsValue>;

    #[wasm_bindgen(method, js_class = "RFB")]
    fn disconnect(this: &Rfb);

    #[wasm_bindgen(method, js_class = "RFB", js_name = approveServer)]
    fn approve_server(this: &Rfb);

    #[wasm_bindgen(method, js_class = "RFB", js_name = sendCredentials)]
    fn send_credentials(this: &Rfb, credentials: &JsValue);

    #[wasm_bindgen(method, js_class = "RFB")]
    fn focus(this: &Rfb);

    #[wasm_bindgen(method, js_class = "RFB", js_name = addEventListener)]
    fn add_event_listener(this: &Rfb, kind: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_class = "RFB", js_name = removeEventListener)]
    fn remove_event_listener(this: &Rfb, kind: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_class = "RFB", setter = viewOnly)]
    fn set_view_only(this: &Rfb, value: bool);

    #[wasm_bindgen(method, js_class = "RFB", setter = clipViewport)]
    fn set_clip_viewport(this: &Rfb, value: bool);

    #[wasm_bindgen(method, js_class = "RFB", setter = scaleViewport)]
    fn set_scale_viewport(this: &Rfb, value: bool);

    #[wasm_bindgen(method, js_class = "RFB", setter = resizeSession)]
    fn set_resize_session(this: &Rfb, value: bool);

    #[wasm_bindgen(method, js_class = "RFB", setter = qualityLevel)]
    fn set_quality_level(this: &Rfb, value: u8);

    #[wasm_bindgen(method, js_class = "RFB", setter = compressionLevel)]
    fn set_compression_level(this: &Rfb, value: u8);

    #[wasm_bindgen(method, js_class = "RFB", setter = showDotCursor)]
    fn set_show_dot_cursor(this: &Rfb, value: bool);
}

/// Events the session listens for
const EVENT_TYPES: [&str; 6] = [
    "connect",
    "disconnect",
    "serververification",
    "credentialsrequired",
    "securityfailure",
    "desktopname",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RfbOptions<'a> {
    shared: bool,
    #[serde(rename = "repeaterID")]
    repeater_id: &'a str,
    credentials: &'a Credentials,
}

// ----------------------------------------------------------------------------
// Event Translation
// ----------------------------------------------------------------------------

fn detail_field(detail: &JsValue, name: &str) -> JsValue {
    Reflect::get(detail, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

fn detail_text(detail: &JsValue, name: &str) -> Option<String> {
    detail_field(detail, name).as_string()
}

/// Translate one RFB event; unknown or malformed events yield `None`
fn translate(kind: &str, detail: &JsValue) -> Option<SessionEvent> {
    let event = match kind {
        "connect" => SessionEvent::Connected,
        "disconnect" => SessionEvent::Disconnected {
            clean: detail_field(detail, "clean").as_bool().unwrap_or(false),
            reason: detail_text(detail, "reason"),
        },
        "serververification" => {
            let key = detail_field(detail, "publickey");
            SessionEvent::ServerVerification {
                key_type: detail_text(detail, "type").unwrap_or_default(),
                public_key: key
                    .dyn_ref::<Uint8Array>()
                    .map(Uint8Array::to_vec)
                    .unwrap_or_default(),
            }
        }
        "credentialsrequired" => {
            let tags: Vec<String> = js_sys::Array::from(&detail_field(detail, "types"))
                .iter()
                .filter_map(|tag| tag.as_string())
                .collect();
            SessionEvent::CredentialsRequired {
                kinds: CredentialKinds::from_tags(tags.iter().map(String::as_str)),
            }
        }
        "securityfailure" => SessionEvent::SecurityFailure {
            reason: detail_text(detail, "reason"),
        },
        "desktopname" => SessionEvent::DesktopName {
            name: detail_text(detail, "name")?,
        },
        _ => return None,
    };
    Some(event)
}

// ----------------------------------------------------------------------------
// RFB Session
// ----------------------------------------------------------------------------

/// One `RFB` instance and the listeners attached to it
pub struct RfbSession {
    rfb: Rfb,
    target: Url,
    listeners: Vec<(&'static str, Closure<dyn FnMut(web_sys::CustomEvent)>)>,
}

impl RfbSession {
    fn attach(rfb: Rfb, target: Url, sink: SessionEventSink) -> Self {
        let listeners = EVENT_TYPES
            .iter()
            .map(|&kind| {
                let sink = sink.clone();
                let listener = Closure::<dyn FnMut(web_sys::CustomEvent)>::new(
                    move |event: web_sys::CustomEvent| match translate(kind, &event.detail()) {
                        Some(event) => {
                            if !sink.emit(event) {
                                debug!(kind, "Session event after controller shut down");
                            }
                        }
                        None => warn!(kind, "Ignoring malformed session event"),
                    },
                );
                rfb.add_event_listener(kind, listener.as_ref().unchecked_ref());
                (kind, listener)
            })
            .collect();
        Self {
            rfb,
            target,
            listeners,
        }
    }

    fn apply_display(&self, options: &SessionOptions) {
        let display = &options.display;
        self.rfb.set_view_only(display.view_only);
        self.rfb.set_clip_viewport(display.clip_viewport);
        self.rfb.set_scale_viewport(display.resize == ResizeMode::Scale);
        self.rfb.set_resize_session(display.resize == ResizeMode::Remote);
        self.rfb.set_quality_level(display.quality_level);
        self.rfb.set_compression_level(display.compression_level);
        self.rfb.set_show_dot_cursor(display.show_dot_cursor);
    }

    /// Plain HTTP(S) URL of the websocket endpoint's origin
    fn http_origin(&self) -> Option<String> {
        let mut origin = self.target.clone();
        let scheme = if origin.scheme() == "wss" { "https" } else { "http" };
        origin.set_scheme(scheme).ok()?;
        origin.set_path("/");
        origin.set_query(None);
        Some(origin.to_string())
    }
}

impl Session for RfbSession {
    fn disconnect(&mut self) {
        self.rfb.disconnect();
    }

    fn approve_server_identity(&mut self) {
        self.rfb.approve_server();
    }

    fn send_credentials(&mut self, credentials: Credentials) {
        match serde_wasm_bindgen::to_value(&credentials) {
            Ok(value) => self.rfb.send_credentials(&value),
            Err(e) => warn!(error = %e, "Could not encode credentials"),
        }
    }

    fn focus(&mut self) {
        self.rfb.focus();
    }

    /// Round trip through the client's own `ping()` when it has one
    fn ping(&self) -> Option<ProbeFuture> {
        let ping = Reflect::get(&self.rfb, &JsValue::from_str("ping"))
            .ok()?
            .dyn_into::<js_sys::Function>()
            .ok()?;
        let rfb: JsValue = self.rfb.clone().into();
        Some(Box::pin(async move {
            let started = Instant::now();
            let result = ping.call0(&rfb).map_err(|e| ProbeError::Failed {
                reason: js_error_text(&e),
            })?;
            let promise = js_sys::Promise::resolve(&result);
            JsFuture::from(promise)
                .await
                .map_err(|e| ProbeError::Failed {
                    reason: js_error_text(&e),
                })?;
            Ok(started.elapsed())
        }))
    }

    /// Time an uncached `HEAD` request to the server's origin
    fn transport_probe(&self) -> Option<ProbeFuture> {
        let origin = self.http_origin()?;
        Some(Box::pin(async move {
            let failed = |e: JsValue| ProbeError::Failed {
                reason: js_error_text(&e),
            };
            let window = window().map_err(failed)?;
            let init = web_sys::RequestInit::new();
            init.set_method("HEAD");
            init.set_mode(web_sys::RequestMode::NoCors);
            let started = Instant::now();
            JsFuture::from(window.fetch_with_str_and_init(&origin, &init))
                .await
                .map_err(failed)?;
            Ok(started.elapsed())
        }))
    }
}

impl Drop for RfbSession {
    fn drop(&mut self) {
        for (kind, listener) in &self.listeners {
            self.rfb
                .remove_event_listener(kind, listener.as_ref().unchecked_ref());
        }
    }
}

// ----------------------------------------------------------------------------
// Session Factory
// ----------------------------------------------------------------------------

/// Creates `RFB` sessions rendering into one container element
pub struct RfbSessionFactory {
    container: web_sys::Element,
}

impl RfbSessionFactory {
    pub fn new(container: web_sys::Element) -> Self {
        Self { container }
    }

    /// Factory for the element with the given id
    pub fn for_element_id(id: &str) -> Result<Self, JsValue> {
        let document = window()?
            .document()
            .ok_or_else(|| JsValue::from_str("No document available"))?;
        let container = document
            .get_element_by_id(id)
            .ok_or_else(|| JsValue::from_str(&format!("No element with id {}", id)))?;
        Ok(Self::new(container))
    }
}

impl SessionFactory for RfbSessionFactory {
    fn create(
        &mut self,
        target: &Url,
        options: SessionOptions,
        sink: SessionEventSink,
    ) -> Result<Box<dyn Session>, SessionError> {
        let construction = |reason: String| SessionError::Construction { reason };
        let rfb_options = serde_wasm_bindgen::to_value(&RfbOptions {
            shared: options.shared,
            repeater_id: &options.repeater_id,
            credentials: &options.credentials,
        })
        .map_err(|e| construction(e.to_string()))?;

        let rfb = Rfb::new(&self.container, target.as_str(), &rfb_options)
            .map_err(|e| construction(js_error_text(&e)))?;
        let session = RfbSession::attach(rfb, target.clone(), sink);
        session.apply_display(&options);
        debug!(target = %target, "RFB session created");
        Ok(Box::new(session))
    }
}
