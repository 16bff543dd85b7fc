//! Connection Controller
//!
//! Top-level state machine of the viewer. It owns the session, decides when
//! to reconnect and coordinates the settings store, the security gate, the
//! latency monitor and the status display.
//!
//! The controller is synchronous. User operations are plain method calls;
//! everything else (session events, timers, probe results) arrives as a
//! [`ControllerInput`] through [`handle`](ConnectionController::handle). Each
//! operation queues [`AppEvent`]s for the view, collected with
//! [`drain_events`](ConnectionController::drain_events).

use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{LogLevel, SessionControlConfig};
use crate::errors::{DeskviewError, Result, SessionError};
use crate::events::AppEvent;
use crate::host::{ControllerInput, Host, InputReceiver, InputSender, TimerId};
use crate::latency::{ConnectionQuality, LatencyMonitor, LatencyReading};
use crate::security::{
    security_failure_message, CredentialPrompt, FingerprintPrompt, SecurityGate, VerificationAction,
};
use crate::session::{
    CredentialKind, CredentialKinds, Credentials, DisplayOptions, ResizeMode, Session,
    SessionEvent, SessionEventSink, SessionFactory, SessionId, SessionOptions,
};
use crate::settings::{
    builtin_default, names, SettingValue, SettingsStore, WriteOutcome, BUILTIN_SETTINGS,
};
use crate::status::{StatusBoard, StatusMessage};
use crate::target::{derive_target, TargetSettings};

/// Window title while no desktop is shown
pub const PAGE_TITLE: &str = "deskview";

const MSG_DISCONNECTED: &str = "Disconnected";
const MSG_CONNECTION_LOST: &str = "Something went wrong, connection is closed";
const MSG_CONNECT_FAILED: &str = "Failed to connect to server";
const MSG_CREDENTIALS_REQUIRED: &str = "Credentials are required";

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle state of the viewer's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Init,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Init => "init",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct LiveSession {
    id: SessionId,
    target: Url,
    handle: Box<dyn Session>,
    connected: bool,
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

pub struct ConnectionController<H: Host> {
    config: SessionControlConfig,
    settings: SettingsStore,
    factory: Box<dyn SessionFactory>,
    host: H,
    inputs: InputSender,
    state: ConnectionState,
    session: Option<LiveSession>,
    next_session_id: SessionId,
    /// Set until the first successful connection and after every manual
    /// disconnect
    inhibit_reconnect: bool,
    reconnect_timer: Option<TimerId>,
    reconnect_password: Option<String>,
    desktop_name: Option<String>,
    log_level: LogLevel,
    security: SecurityGate,
    latency: LatencyMonitor,
    status: StatusBoard,
    events: VecDeque<AppEvent>,
}

impl<H: Host> ConnectionController<H> {
    /// Create a controller in the `Init` state
    ///
    /// `inputs` is the sending half of the queue whose receiving half is fed
    /// back through [`handle`](Self::handle); sessions get a clone of it.
    /// The settings store should already be initialized.
    pub fn new(
        config: SessionControlConfig,
        settings: SettingsStore,
        factory: Box<dyn SessionFactory>,
        host: H,
        inputs: InputSender,
    ) -> Self {
        if !settings.is_initialized() {
            warn!("Connection controller created before settings were loaded");
        }
        Self {
            security: SecurityGate::new(&config.fingerprint, config.view.clone()),
            latency: LatencyMonitor::new(config.latency.clone()),
            status: StatusBoard::new(config.status.clone()),
            config,
            settings,
            factory,
            host,
            inputs,
            state: ConnectionState::Init,
            session: None,
            next_session_id: 1,
            inhibit_reconnect: true,
            reconnect_timer: None,
            reconnect_password: None,
            desktop_name: None,
            log_level: LogLevel::default(),
            events: VecDeque::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------------

    /// Resolve every built-in setting, then connect if `autoconnect` is set
    ///
    /// Forced settings are announced with [`AppEvent::SettingForced`] so the
    /// view can disable their controls.
    pub fn start(&mut self) -> Result<()> {
        for spec in BUILTIN_SETTINGS {
            let default = builtin_default(spec.name, self.settings.page_url());
            let value = self.settings.resolve(spec.name, default);
            if let (true, Some(value)) = (self.settings.is_forced(spec.name), value) {
                self.push_event(AppEvent::SettingForced {
                    name: spec.name.to_string(),
                    value,
                });
            }
        }
        self.refresh_log_level();
        info!(
            log_level = self.log_level.as_str(),
            degraded = self.settings.is_degraded(),
            "Viewer started"
        );

        if self.settings.read_bool(names::AUTOCONNECT).unwrap_or(false) {
            self.connect()
        } else {
            self.push_event(AppEvent::ConnectPanelRequested);
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // User Operations
    // ------------------------------------------------------------------------

    /// Start a connection using the current settings
    ///
    /// Does nothing while a session exists. Synchronous failures (bad target,
    /// construction error) leave the controller `Disconnected`, show an error
    /// status and are returned.
    pub fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!(state = %self.state, "Session already exists, ignoring connect");
            return Ok(());
        }
        let password = self.settings.read_text(names::PASSWORD);
        self.reconnect_password = password.clone();
        self.open_session(password)
    }

    /// Close the session on user request
    ///
    /// Automatic reconnection stays inhibited until a later connection
    /// succeeds. While waiting to reconnect this cancels the retry instead.
    pub fn disconnect(&mut self) {
        match self.state {
            ConnectionState::Reconnecting => self.cancel_reconnect(),
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.inhibit_reconnect = true;
                self.stop_latency();
                if let Some(live) = self.session.as_mut() {
                    info!(session_id = live.id, "Disconnect requested");
                    live.handle.disconnect();
                }
                self.transition(ConnectionState::Disconnecting);
            }
            state => debug!(%state, "Nothing to disconnect"),
        }
    }

    /// Abandon a pending reconnect or an in-progress connection attempt
    pub fn cancel_reconnect(&mut self) {
        self.clear_reconnect_timer();
        match self.state {
            ConnectionState::Reconnecting => {}
            ConnectionState::Connecting => {
                self.inhibit_reconnect = true;
                if let Some(mut live) = self.session.take() {
                    info!(session_id = live.id, "Connection attempt cancelled");
                    live.handle.disconnect();
                }
                self.end_session_state();
            }
            state => {
                debug!(%state, "No reconnect to cancel");
                return;
            }
        }
        self.transition(ConnectionState::Disconnected);
        self.push_event(AppEvent::ConnectPanelRequested);
    }

    /// Trust the server identity being shown
    pub fn approve_server(&mut self) -> Result<()> {
        self.security.approve_server()?;
        self.push_event(AppEvent::FingerprintPromptClosed);
        let live = self.session.as_mut().ok_or(SessionError::NoSession)?;
        info!(session_id = live.id, "Server identity approved");
        live.handle.approve_server_identity();
        Ok(())
    }

    /// Refuse the server identity being shown and disconnect
    pub fn reject_server(&mut self) -> Result<()> {
        self.security.reject_server()?;
        self.push_event(AppEvent::FingerprintPromptClosed);
        warn!("Server identity rejected by user");
        self.disconnect();
        Ok(())
    }

    /// Update a field of the open credential prompt
    pub fn set_credential(&mut self, kind: CredentialKind, value: &str) -> Result<()> {
        self.security.set_field(kind, value)
    }

    /// Send the requested credentials to the session
    ///
    /// The submitted password is kept for automatic reconnects.
    pub fn submit_credentials(&mut self) -> Result<()> {
        let credentials = self.security.submit()?;
        if let Some(password) = &credentials.password {
            self.reconnect_password = Some(password.clone());
        }
        self.push_event(AppEvent::CredentialPromptClosed);
        let live = self.session.as_mut().ok_or(SessionError::NoSession)?;
        debug!(session_id = live.id, "Sending credentials");
        live.handle.send_credentials(credentials);
        Ok(())
    }

    /// Dismiss the visible status message
    pub fn hide_status(&mut self) {
        if self.status.hide(&mut self.host) {
            self.push_event(AppEvent::StatusHidden);
        }
    }

    /// Change a setting from the view; returns `false` if it was refused
    pub fn write_setting(&mut self, name: &str, value: SettingValue) -> bool {
        let accepted = match self.settings.write(name, value) {
            WriteOutcome::Persist(persist) => {
                self.host.spawn_task(persist);
                true
            }
            WriteOutcome::Unchanged => true,
            WriteOutcome::Refused => false,
        };
        if accepted && name == names::LOGGING {
            self.refresh_log_level();
        }
        accepted
    }

    /// Forget a setting; returns `false` for forced settings
    pub fn erase_setting(&mut self, name: &str) -> bool {
        match self.settings.erase(name) {
            Some(erase) => {
                self.host.spawn_task(erase);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Input Handling
    // ------------------------------------------------------------------------

    /// Process one queued input
    pub fn handle(&mut self, input: ControllerInput) {
        match input {
            ControllerInput::Session { session_id, event } => {
                self.on_session_event(session_id, event)
            }
            ControllerInput::TimerFired(id) => self.on_timer(id),
            ControllerInput::ProbeCompleted { probe_id, outcome } => {
                if let Some(reading) =
                    self.latency
                        .on_probe_completed(probe_id, outcome, &mut self.host)
                {
                    self.push_event(AppEvent::latency(reading));
                }
            }
        }
    }

    /// Process every input already waiting on the queue
    pub fn process_pending(&mut self, inputs: &mut InputReceiver) -> usize {
        let mut handled = 0;
        while let Ok(input) = inputs.try_recv() {
            self.handle(input);
            handled += 1;
        }
        handled
    }

    fn on_session_event(&mut self, session_id: SessionId, event: SessionEvent) {
        match &self.session {
            Some(live) if live.id == session_id => {}
            _ => {
                debug!(session_id, event = event.name(), "Dropping event from stale session");
                return;
            }
        }

        match event {
            SessionEvent::Connected => self.on_connected(),
            SessionEvent::Disconnected { clean, reason } => self.on_disconnected(clean, reason),
            SessionEvent::ServerVerification {
                key_type,
                public_key,
            } => self.on_server_verification(&key_type, &public_key),
            SessionEvent::CredentialsRequired { kinds } => self.on_credentials_required(kinds),
            SessionEvent::SecurityFailure { reason } => {
                let text = security_failure_message(reason.as_deref());
                error!(session_id, "{}", text);
                self.show_status(StatusMessage::security(text));
            }
            SessionEvent::DesktopName { name } => {
                let title = format!("{} - {}", name, PAGE_TITLE);
                self.desktop_name = Some(name.clone());
                self.push_event(AppEvent::DesktopNameChanged { name, title });
            }
        }
    }

    fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Ignoring connect signal outside Connecting");
            return;
        }
        let mut reading = None;
        let mut encrypted = false;
        let mut peer = String::new();
        if let Some(live) = self.session.as_mut() {
            live.connected = true;
            encrypted = live.target.scheme() == "wss";
            peer = live.target.host_str().unwrap_or_default().to_string();
            info!(session_id = live.id, target = %live.target, "Session connected");
            reading = self.latency.start(&mut self.host, live.handle.as_ref());
            live.handle.focus();
        }

        self.inhibit_reconnect = false;
        self.transition(ConnectionState::Connected);

        let desktop = self.desktop_name.clone().unwrap_or(peer);
        let text = if encrypted {
            format!("Connected (encrypted) to {}", desktop)
        } else {
            format!("Connected (unencrypted) to {}", desktop)
        };
        self.show_status(StatusMessage::normal(text));
        if let Some(reading) = reading {
            self.push_event(AppEvent::latency(reading));
        }
    }

    fn on_disconnected(&mut self, clean: bool, reason: Option<String>) {
        let Some(live) = self.session.take() else {
            return;
        };
        info!(session_id = live.id, clean, reason = ?reason, "Session ended");
        let was_connected = live.connected;
        drop(live);
        self.end_session_state();

        if !clean {
            let base = if was_connected {
                MSG_CONNECTION_LOST
            } else {
                MSG_CONNECT_FAILED
            };
            let text = match reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                Some(reason) => format!("{}: {}", base, reason),
                None => base.to_string(),
            };
            if self.config.suppression.suppresses(&text) {
                info!(message = %text, "Suppressed transport error");
            } else {
                self.show_status(StatusMessage::error(text));
            }

            let reconnect = self.settings.read_bool(names::RECONNECT).unwrap_or(false);
            if reconnect && !self.inhibit_reconnect {
                let delay = self.reconnect_delay();
                info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
                self.transition(ConnectionState::Reconnecting);
                self.reconnect_timer = Some(self.host.set_timer(delay));
                return;
            }
        }

        self.transition(ConnectionState::Disconnected);
        self.show_status(StatusMessage::normal(MSG_DISCONNECTED));
        self.push_event(AppEvent::ConnectPanelRequested);
    }

    fn on_server_verification(&mut self, key_type: &str, public_key: &[u8]) {
        match self.security.on_server_verification(key_type, public_key) {
            VerificationAction::Prompt(prompt) => {
                self.push_event(AppEvent::FingerprintPrompt { prompt });
            }
            VerificationAction::Reject { reason } => {
                warn!(key_type, "Rejecting server identity: {}", reason);
                self.disconnect();
            }
        }
    }

    fn on_credentials_required(&mut self, kinds: CredentialKinds) {
        match self.security.on_credentials_required(kinds) {
            Some(prompt) => {
                self.show_status(StatusMessage::warning(MSG_CREDENTIALS_REQUIRED));
                self.push_event(AppEvent::CredentialPrompt { prompt });
            }
            None => {
                warn!(?kinds, "Cannot collect requested credentials, disconnecting");
                self.disconnect();
            }
        }
    }

    fn on_timer(&mut self, id: TimerId) {
        if self.reconnect_timer == Some(id) {
            self.reconnect_timer = None;
            self.on_reconnect_timer();
        } else if self.status.owns_timer(id) {
            if self.status.on_timer(id) {
                self.push_event(AppEvent::StatusHidden);
            }
        } else if self.latency.owns_timer(id) {
            let session = self
                .session
                .as_ref()
                .filter(|live| live.connected)
                .map(|live| live.handle.as_ref());
            if let Some(reading) = self.latency.on_timer(id, &mut self.host, session) {
                self.push_event(AppEvent::latency(reading));
            }
        } else {
            debug!(timer = %id, "Ignoring stale timer");
        }
    }

    fn on_reconnect_timer(&mut self) {
        if self.state != ConnectionState::Reconnecting {
            debug!(state = %self.state, "Reconnect timer fired outside reconnecting");
            return;
        }
        if self.inhibit_reconnect {
            self.transition(ConnectionState::Disconnected);
            self.push_event(AppEvent::ConnectPanelRequested);
            return;
        }
        info!("Reconnecting");
        let password = self.reconnect_password.clone();
        if let Err(e) = self.open_session(password) {
            warn!("Reconnect failed: {}", e);
        }
    }

    // ------------------------------------------------------------------------
    // Session Lifecycle
    // ------------------------------------------------------------------------

    fn open_session(&mut self, password: Option<String>) -> Result<()> {
        self.clear_reconnect_timer();
        self.hide_status();
        self.transition(ConnectionState::Connecting);

        let target = TargetSettings::from_store(&self.settings);
        let url = match derive_target(&target, self.settings.page_url()) {
            Ok(url) => url,
            Err(e) => return self.fail_connect(e.into()),
        };

        let session_id = self.next_session_id;
        self.next_session_id += 1;
        let options = self.session_options(password);
        let sink = SessionEventSink::new(session_id, self.inputs.clone());

        match self.factory.create(&url, options, sink) {
            Ok(handle) => {
                info!(session_id, target = %url, "Session created");
                self.session = Some(LiveSession {
                    id: session_id,
                    target: url,
                    handle,
                    connected: false,
                });
                Ok(())
            }
            Err(e) => self.fail_connect(e.into()),
        }
    }

    fn fail_connect(&mut self, err: DeskviewError) -> Result<()> {
        error!("Failed to connect: {}", err);
        self.transition(ConnectionState::Disconnected);
        self.show_status(StatusMessage::error(format!("{}: {}", MSG_CONNECT_FAILED, err)));
        self.push_event(AppEvent::ConnectPanelRequested);
        Err(err)
    }

    fn session_options(&self, password: Option<String>) -> SessionOptions {
        let level = |name: &str, default: u8| {
            self.settings
                .read_number(name)
                .map(|n| n.round().clamp(0.0, 9.0) as u8)
                .unwrap_or(default)
        };
        let defaults = DisplayOptions::default();
        SessionOptions {
            shared: self.settings.read_bool(names::SHARED).unwrap_or(true),
            repeater_id: self.settings.read_text(names::REPEATER_ID).unwrap_or_default(),
            credentials: Credentials {
                username: None,
                password,
            },
            display: DisplayOptions {
                view_only: self.settings.read_bool(names::VIEW_ONLY).unwrap_or(false),
                clip_viewport: self.settings.read_bool(names::VIEW_CLIP).unwrap_or(false),
                resize: self
                    .settings
                    .read_text(names::RESIZE)
                    .map(|mode| ResizeMode::from_setting(&mode))
                    .unwrap_or_default(),
                show_dot_cursor: self.settings.read_bool(names::SHOW_DOT).unwrap_or(false),
                quality_level: level(names::QUALITY, defaults.quality_level),
                compression_level: level(names::COMPRESSION, defaults.compression_level),
            },
        }
    }

    fn reconnect_delay(&self) -> core::time::Duration {
        let millis = self
            .settings
            .read_number(names::RECONNECT_DELAY)
            .filter(|ms| *ms >= 0.0)
            .unwrap_or(5000.0);
        core::time::Duration::from_millis(millis as u64)
    }

    /// Shared teardown once the session handle is gone
    fn end_session_state(&mut self) {
        self.stop_latency();
        let (fingerprint_open, credentials_open) = self.security.reset();
        if fingerprint_open {
            self.push_event(AppEvent::FingerprintPromptClosed);
        }
        if credentials_open {
            self.push_event(AppEvent::CredentialPromptClosed);
        }
        if self.desktop_name.take().is_some() {
            debug!("Desktop name cleared");
        }
        self.push_event(AppEvent::TitleChanged {
            title: PAGE_TITLE.to_string(),
        });
    }

    fn clear_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            self.host.clear_timer(timer);
        }
    }

    fn stop_latency(&mut self) {
        if let Some(reading) = self.latency.stop(&mut self.host) {
            self.push_event(AppEvent::latency(reading));
        }
    }

    fn show_status(&mut self, message: StatusMessage) {
        if self.status.show(message.clone(), &mut self.host) {
            self.push_event(AppEvent::StatusShown { message });
        }
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!(%from, %to, "Connection state changed");
        self.state = to;
        self.push_event(AppEvent::StateChanged { from, to });
    }

    fn refresh_log_level(&mut self) {
        self.log_level = self
            .settings
            .read_text(names::LOGGING)
            .and_then(|value| LogLevel::from_setting(&value))
            .unwrap_or_default();
    }

    fn push_event(&mut self, event: AppEvent) {
        self.events.push_back(event);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Take every event queued since the last call
    pub fn drain_events(&mut self) -> Vec<AppEvent> {
        self.events.drain(..).collect()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn latency(&self) -> LatencyReading {
        self.latency.published()
    }

    pub fn quality(&self) -> ConnectionQuality {
        self.latency.published().quality()
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.visible()
    }

    pub fn desktop_name(&self) -> Option<&str> {
        self.desktop_name.as_deref()
    }

    pub fn title(&self) -> String {
        match &self.desktop_name {
            Some(name) => format!("{} - {}", name, PAGE_TITLE),
            None => PAGE_TITLE.to_string(),
        }
    }

    pub fn pending_fingerprint(&self) -> Option<&FingerprintPrompt> {
        self.security.pending_fingerprint()
    }

    pub fn pending_credentials(&self) -> Option<&CredentialPrompt> {
        self.security.pending_credentials()
    }

    /// Current input in an open credential prompt field
    pub fn credential_field(&self, kind: CredentialKind) -> Option<&str> {
        self.security.field_value(kind)
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn read_setting(&self, name: &str) -> Option<SettingValue> {
        self.settings.read(name)
    }

    pub fn is_reconnect_inhibited(&self) -> bool {
        self.inhibit_reconnect
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|live| live.id)
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn config(&self) -> &SessionControlConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: Host> fmt::Debug for ConnectionController<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionController")
            .field("state", &self.state)
            .field("session_id", &self.session_id())
            .field("inhibit_reconnect", &self.inhibit_reconnect)
            .field("reconnect_timer", &self.reconnect_timer)
            .field("latency", &self.latency.published())
            .field("status", &self.status.visible())
            .finish()
    }
}
