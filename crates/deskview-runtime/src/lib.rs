//! Deskview Native Runtime
//!
//! Hosts the [`deskview_core`] connection controller on a tokio `LocalSet`.
//! The runtime supplies timers and probe tasks through [`TokioHost`], keeps
//! settings in a JSON file through [`JsonFileBackend`], and exposes the
//! controller to the embedding application as a command channel plus an
//! app-event stream.
//!
//! Everything the controller owns is single-threaded, so the runtime must be
//! started from inside a [`tokio::task::LocalSet`].

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod builder;
pub mod errors;
pub mod host;
pub mod logging;
pub mod runtime;
pub mod storage;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use errors::{RuntimeError, RuntimeResult};
pub use host::TokioHost;
pub use logging::{init_logging, LogHandle};
pub use runtime::{RuntimeCommand, RuntimeSnapshot, SessionRuntime};
pub use storage::JsonFileBackend;

// Re-export the core crate so embedders need a single dependency
pub use deskview_core as core;
