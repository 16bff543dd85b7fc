//! Deskview Session Control Core
//!
//! This crate holds the stateful part of the deskview remote-desktop client:
//! the connection lifecycle state machine, layered settings resolution and
//! persistence, server identity and credential negotiation, and latency
//! monitoring. It is headless and runtime agnostic. Timers, probe futures and
//! the remote-framebuffer protocol itself are reached through the [`Host`] and
//! [`SessionFactory`] seams, so the same core runs under tokio natively and
//! under `wasm-bindgen` in the browser.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod host;
pub mod latency;
pub mod security;
pub mod session;
pub mod settings;
pub mod status;
pub mod target;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    FingerprintConfig, LatencyConfig, LogLevel, SessionControlConfig, StatusConfig,
    SuppressionPolicy, ViewCapabilities,
};
pub use controller::{ConnectionController, ConnectionState, PAGE_TITLE};
pub use errors::{
    DeskviewError, DeskviewResult, ProbeError, Result, SessionError, SettingsError, TargetError,
};
pub use events::AppEvent;
pub use host::{input_channel, ControllerInput, Host, InputReceiver, InputSender, ProbeId, TimerId};
pub use latency::{ConnectionQuality, LatencyMonitor, LatencyReading, LatencyWindow};
pub use security::{
    compute_fingerprint, format_fingerprint, security_failure_message, CredentialPrompt,
    FingerprintDigest, FingerprintPrompt, SecurityGate, VerificationAction,
};
pub use session::{
    CredentialKind, CredentialKinds, Credentials, DisplayOptions, ProbeFuture, ResizeMode,
    Session, SessionEvent, SessionEventSink, SessionFactory, SessionId, SessionOptions,
};
pub use settings::{
    names, EmbeddingConfig, MemoryBackend, PersistFuture, Setting, SettingKind, SettingOrigin,
    SettingValue, SettingsBackend, SettingsMap, SettingsStore, UrlParams, WriteOutcome,
};
pub use status::{StatusBoard, StatusKind, StatusMessage};
pub use target::{derive_target, TargetSettings};
