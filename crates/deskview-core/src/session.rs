//! Session capability
//!
//! A [`Session`] is one attempt at a remote-framebuffer connection. The wire
//! protocol lives entirely behind this trait; the controller only needs the
//! lifecycle events and a handful of operations.

use core::fmt;
use core::time::Duration;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{ProbeError, SessionError};
use crate::host::{ControllerInput, InputSender};

/// Monotonic identifier of a session within one controller
pub type SessionId = u64;

/// A single round-trip measurement in flight
pub type ProbeFuture = LocalBoxFuture<'static, Result<Duration, ProbeError>>;

// ----------------------------------------------------------------------------
// Credentials
// ----------------------------------------------------------------------------

/// Kind of credential a server may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Username,
    Password,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Username => write!(f, "username"),
            CredentialKind::Password => write!(f, "password"),
        }
    }
}

/// Set of requested credential kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CredentialKinds {
    pub username: bool,
    pub password: bool,
}

impl CredentialKinds {
    pub fn password_only() -> Self {
        Self {
            username: false,
            password: true,
        }
    }

    pub fn both() -> Self {
        Self {
            username: true,
            password: true,
        }
    }

    /// Build from the type tags a session reports, ignoring unknown tags
    pub fn from_tags<'a, I: IntoIterator<Item = &'a str>>(tags: I) -> Self {
        let mut kinds = Self::default();
        for tag in tags {
            match tag {
                "username" => kinds.username = true,
                "password" => kinds.password = true,
                _ => {}
            }
        }
        kinds
    }

    pub fn contains(&self, kind: CredentialKind) -> bool {
        match kind {
            CredentialKind::Username => self.username,
            CredentialKind::Password => self.password,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.username && !self.password
    }

    /// Field that receives input focus when the prompt opens
    pub fn first(&self) -> Option<CredentialKind> {
        if self.username {
            Some(CredentialKind::Username)
        } else if self.password {
            Some(CredentialKind::Password)
        } else {
            None
        }
    }
}

/// Credentials delivered to a session; absent fields were not requested
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            username: None,
            password: Some(password.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

// ----------------------------------------------------------------------------
// Session Options
// ----------------------------------------------------------------------------

/// How the remote framebuffer is fitted to the local viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    Off,
    #[default]
    Scale,
    Remote,
}

impl ResizeMode {
    pub fn from_setting(value: &str) -> Self {
        match value {
            "off" => ResizeMode::Off,
            "remote" => ResizeMode::Remote,
            _ => ResizeMode::Scale,
        }
    }
}

/// Presentation options applied to the session after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub view_only: bool,
    pub clip_viewport: bool,
    pub resize: ResizeMode,
    pub show_dot_cursor: bool,
    pub quality_level: u8,
    pub compression_level: u8,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            view_only: false,
            clip_viewport: false,
            resize: ResizeMode::Scale,
            show_dot_cursor: false,
            quality_level: 6,
            compression_level: 2,
        }
    }
}

/// Everything a [`SessionFactory`] needs besides the target URL
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub shared: bool,
    pub repeater_id: String,
    pub credentials: Credentials,
    pub display: DisplayOptions,
}

// ----------------------------------------------------------------------------
// Session Events
// ----------------------------------------------------------------------------

/// Lifecycle events a session raises, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected {
        clean: bool,
        reason: Option<String>,
    },
    ServerVerification {
        key_type: String,
        public_key: Vec<u8>,
    },
    CredentialsRequired {
        kinds: CredentialKinds,
    },
    SecurityFailure {
        reason: Option<String>,
    },
    DesktopName {
        name: String,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connect",
            SessionEvent::Disconnected { .. } => "disconnect",
            SessionEvent::ServerVerification { .. } => "serververification",
            SessionEvent::CredentialsRequired { .. } => "credentialsrequired",
            SessionEvent::SecurityFailure { .. } => "securityfailure",
            SessionEvent::DesktopName { .. } => "desktopname",
        }
    }
}

/// Delivers one session's events onto the controller input queue
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    session_id: SessionId,
    inputs: InputSender,
}

impl SessionEventSink {
    pub fn new(session_id: SessionId, inputs: InputSender) -> Self {
        Self { session_id, inputs }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue an event; returns `false` once the controller is gone
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.inputs
            .unbounded_send(ControllerInput::Session {
                session_id: self.session_id,
                event,
            })
            .is_ok()
    }
}

// ----------------------------------------------------------------------------
// Session Traits
// ----------------------------------------------------------------------------

/// Operations the controller performs on a live session
pub trait Session {
    /// Request teardown; completion is reported as a `Disconnected` event
    fn disconnect(&mut self);

    /// Let the handshake continue after the user trusted the server key
    fn approve_server_identity(&mut self);

    fn send_credentials(&mut self, credentials: Credentials);

    /// Give input focus to the remote surface
    fn focus(&mut self);

    /// Protocol-level round trip, if the session supports one
    fn ping(&self) -> Option<ProbeFuture> {
        None
    }

    /// Raw transport round trip used when `ping` is unavailable
    fn transport_probe(&self) -> Option<ProbeFuture> {
        None
    }
}

/// Creates sessions for the controller
pub trait SessionFactory {
    /// Start a connection attempt. Errors returned here are synchronous
    /// construction failures; later failures arrive as events on `sink`.
    fn create(
        &mut self,
        target: &Url,
        options: SessionOptions,
        sink: SessionEventSink,
    ) -> Result<Box<dyn Session>, SessionError>;
}
