//! Error types for deskview session control
//!
//! Specific error enums for each concern (settings storage, connection target
//! construction, session handling, latency probing) unified under
//! [`DeskviewError`].

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Settings storage and defaults errors
///
/// These never reach the view layer: the settings store logs them and keeps
/// running on its in-memory cache.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Storage read failed: {reason}")]
    StorageRead { reason: String },
    #[error("Storage write failed for setting {name}: {reason}")]
    StorageWrite { name: String, reason: String },
    #[error("Storage erase failed for setting {name}: {reason}")]
    StorageErase { name: String, reason: String },
    #[error("Defaults document unavailable: {reason}")]
    Defaults { reason: String },
    #[error("Setting {name} is forced by the embedding configuration")]
    Forced { name: String },
    #[error("Settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors building the connection target URL
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid port: {value}")]
    InvalidPort { value: String },
    #[error("Cannot use scheme {scheme} for {url}")]
    Scheme { scheme: String, url: String },
}

/// Session construction and lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session construction failed: {reason}")]
    Construction { reason: String },
    #[error("No live session")]
    NoSession,
    #[error("Session {session_id} is closed")]
    Closed { session_id: u64 },
}

/// Latency probe errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("No latency probe available")]
    Unavailable,
    #[error("Latency probe failed: {reason}")]
    Failed { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for deskview session control
#[derive(Debug, thiserror::Error)]
pub enum DeskviewError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Connection target error: {0}")]
    Target(#[from] TargetError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Operation not valid for the current negotiation or connection state
    #[error("Operation {operation} is not valid in state {state}")]
    InvalidState { state: String, operation: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl DeskviewError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        DeskviewError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>, O: Into<String>>(state: S, operation: O) -> Self {
        DeskviewError::InvalidState {
            state: state.into(),
            operation: operation.into(),
        }
    }

    /// Create a session construction error
    pub fn session_construction<T: Into<String>>(reason: T) -> Self {
        DeskviewError::Session(SessionError::Construction {
            reason: reason.into(),
        })
    }

    /// Create a storage read error
    pub fn storage_read<T: Into<String>>(reason: T) -> Self {
        DeskviewError::Settings(SettingsError::StorageRead {
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, DeskviewError>;
pub type DeskviewResult<T> = Result<T>;
