//! Session Runtime
//!
//! Owns the connection controller and serializes everything that drives it:
//! commands from the embedding application and inputs raised by sessions,
//! timers and probes. App events produced by each step are forwarded to the
//! application in order.

use crate::host::TokioHost;
use crate::logging::LogHandle;
use deskview_core::{
    AppEvent, ConnectionController, ConnectionQuality, ConnectionState, CredentialKind,
    InputReceiver, LatencyReading, SettingValue, StatusMessage,
};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::RuntimeResult;

pub type CommandSender = mpsc::UnboundedSender<RuntimeCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<RuntimeCommand>;
pub type AppEventSender = mpsc::UnboundedSender<AppEvent>;
pub type AppEventReceiver = mpsc::UnboundedReceiver<AppEvent>;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// User operations forwarded to the controller
#[derive(Debug)]
pub enum RuntimeCommand {
    Connect,
    Disconnect,
    CancelReconnect,
    ApproveServer,
    RejectServer,
    SetCredential { kind: CredentialKind, value: String },
    SubmitCredentials,
    WriteSetting { name: String, value: SettingValue },
    EraseSetting { name: String },
    HideStatus,
    Snapshot(oneshot::Sender<RuntimeSnapshot>),
    Shutdown,
}

impl RuntimeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeCommand::Connect => "connect",
            RuntimeCommand::Disconnect => "disconnect",
            RuntimeCommand::CancelReconnect => "cancel_reconnect",
            RuntimeCommand::ApproveServer => "approve_server",
            RuntimeCommand::RejectServer => "reject_server",
            RuntimeCommand::SetCredential { .. } => "set_credential",
            RuntimeCommand::SubmitCredentials => "submit_credentials",
            RuntimeCommand::WriteSetting { .. } => "write_setting",
            RuntimeCommand::EraseSetting { .. } => "erase_setting",
            RuntimeCommand::HideStatus => "hide_status",
            RuntimeCommand::Snapshot(_) => "snapshot",
            RuntimeCommand::Shutdown => "shutdown",
        }
    }
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeSnapshot {
    pub state: ConnectionState,
    pub latency: LatencyReading,
    pub quality: ConnectionQuality,
    pub status: Option<StatusMessage>,
    pub title: String,
    pub desktop_name: Option<String>,
    pub reconnect_scheduled: bool,
}

// ----------------------------------------------------------------------------
// Session Runtime
// ----------------------------------------------------------------------------

/// Event loop around a [`ConnectionController`]
pub struct SessionRuntime {
    controller: ConnectionController<TokioHost>,
    inputs: InputReceiver,
    commands: CommandReceiver,
    events: AppEventSender,
    logging: LogHandle,
}

impl SessionRuntime {
    pub fn new(
        controller: ConnectionController<TokioHost>,
        inputs: InputReceiver,
        commands: CommandReceiver,
        events: AppEventSender,
        logging: LogHandle,
    ) -> Self {
        Self {
            controller,
            inputs,
            commands,
            events,
            logging,
        }
    }

    /// Start the controller and process commands and inputs until shutdown
    ///
    /// A failed autoconnect is reported through the event stream and does
    /// not stop the loop.
    pub async fn run(mut self) -> RuntimeResult<()> {
        if let Err(e) = self.controller.start() {
            warn!(error = %e, "Autoconnect failed");
        }
        self.after_step();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(RuntimeCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                input = self.inputs.next() => match input {
                    Some(input) => self.controller.handle(input),
                    None => break,
                },
            }
            self.after_step();
        }

        info!(state = %self.controller.state(), "Session runtime shutting down");
        self.controller.disconnect();
        self.after_step();
        Ok(())
    }

    fn apply(&mut self, command: RuntimeCommand) {
        debug!(command = command.name(), "Runtime command");
        let result = match command {
            RuntimeCommand::Connect => self.controller.connect(),
            RuntimeCommand::Disconnect => {
                self.controller.disconnect();
                Ok(())
            }
            RuntimeCommand::CancelReconnect => {
                self.controller.cancel_reconnect();
                Ok(())
            }
            RuntimeCommand::ApproveServer => self.controller.approve_server(),
            RuntimeCommand::RejectServer => self.controller.reject_server(),
            RuntimeCommand::SetCredential { kind, value } => {
                self.controller.set_credential(kind, &value)
            }
            RuntimeCommand::SubmitCredentials => self.controller.submit_credentials(),
            RuntimeCommand::WriteSetting { name, value } => {
                if !self.controller.write_setting(&name, value) {
                    info!(%name, "Setting write refused");
                }
                Ok(())
            }
            RuntimeCommand::EraseSetting { name } => {
                if !self.controller.erase_setting(&name) {
                    info!(%name, "Setting erase refused");
                }
                Ok(())
            }
            RuntimeCommand::HideStatus => {
                self.controller.hide_status();
                Ok(())
            }
            RuntimeCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
            RuntimeCommand::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Runtime command failed");
        }
    }

    fn after_step(&mut self) {
        self.logging.set_level(self.controller.log_level());
        for event in self.controller.drain_events() {
            if self.events.send(event).is_err() {
                debug!("App event receiver dropped");
            }
        }
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            state: self.controller.state(),
            latency: self.controller.latency(),
            quality: self.controller.quality(),
            status: self.controller.status().cloned(),
            title: self.controller.title(),
            desktop_name: self.controller.desktop_name().map(str::to_string),
            reconnect_scheduled: self.controller.is_reconnect_scheduled(),
        }
    }

    pub fn controller(&self) -> &ConnectionController<TokioHost> {
        &self.controller
    }
}

impl std::fmt::Debug for SessionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRuntime")
            .field("controller", &self.controller)
            .field("logging", &self.logging)
            .finish()
    }
}
