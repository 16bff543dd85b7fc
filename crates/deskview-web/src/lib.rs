//! Deskview WebAssembly Frontend - Web Composition Root
//!
//! Wires the session-control core to the browser:
//! - `setTimeout`-backed timers and `spawn_local` probes ([`WebHost`])
//! - settings from `defaults.json` plus extension or local storage
//!   ([`LocalStorageBackend`])
//! - sessions over the page's JavaScript `RFB` class ([`RfbSessionFactory`])
//! - a `#[wasm_bindgen]` API for the view layer ([`DeskviewWebApp`])

use wasm_bindgen::prelude::*;

mod app;
mod host;
mod session;
mod storage;
mod utils;

pub use app::*;
pub use host::WebHost;
pub use session::{RfbSession, RfbSessionFactory};
pub use storage::LocalStorageBackend;
pub use utils::*;

// Initialize WASM module
#[wasm_bindgen(start)]
pub fn main() {
    utils::set_panic_hook();
}
