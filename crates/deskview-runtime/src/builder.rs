//! Runtime Builder API
//!
//! Assembles settings, the session factory and the tokio host into a running
//! [`SessionRuntime`] and hands back a [`RuntimeHandle`] for issuing commands
//! and reading app events.

use crate::errors::{RuntimeError, RuntimeResult};
use crate::host::TokioHost;
use crate::logging::{init_logging, LogHandle};
use crate::runtime::{
    AppEventReceiver, CommandSender, RuntimeCommand, RuntimeSnapshot, SessionRuntime,
};
use crate::storage::JsonFileBackend;
use deskview_core::{
    input_channel, AppEvent, ConnectionController, CredentialKind, DeskviewError,
    EmbeddingConfig, LogLevel, MemoryBackend, SessionControlConfig, SessionFactory,
    SettingValue, SettingsBackend, SettingsStore,
};
use std::path::PathBuf;
use std::rc::Rc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a deskview session runtime
pub struct RuntimeBuilder {
    config: SessionControlConfig,
    config_file: Option<PathBuf>,
    embedding: EmbeddingConfig,
    backend: Option<Rc<dyn SettingsBackend>>,
    factory: Option<Box<dyn SessionFactory>>,
    console_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionControlConfig::default(),
            config_file: None,
            embedding: EmbeddingConfig::default(),
            backend: None,
            factory: None,
            console_logging: false,
        }
    }

    /// Set the session-control configuration
    pub fn with_config(mut self, config: SessionControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the session-control configuration from a JSON file at build time
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Mandatory values, embedding defaults and the page URL
    pub fn with_embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_settings_backend(mut self, backend: Rc<dyn SettingsBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Persist settings in the given JSON file
    pub fn with_settings_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_settings_backend(Rc::new(JsonFileBackend::new(path)))
    }

    /// Register the factory that opens remote-framebuffer sessions
    pub fn with_session_factory(mut self, factory: Box<dyn SessionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Install a console subscriber whose level follows the `logging` setting
    pub fn with_console_logging(mut self) -> Self {
        self.console_logging = true;
        self
    }

    /// Assemble the runtime without starting it
    ///
    /// Must be called inside a `LocalSet`; settings are loaded here.
    pub async fn build(self) -> RuntimeResult<(SessionRuntime, RuntimeHandle)> {
        let factory = self
            .factory
            .ok_or_else(|| DeskviewError::config_error("No session factory registered"))?;

        let config = match &self.config_file {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| RuntimeError::io(path, e))?;
                SessionControlConfig::from_json(&json)?
            }
            None => self.config,
        };

        let backend: Rc<dyn SettingsBackend> = match self.backend {
            Some(backend) => backend,
            None => match JsonFileBackend::default_location() {
                Some(file) => Rc::new(file),
                None => {
                    warn!("No configuration directory, settings will not persist");
                    Rc::new(MemoryBackend::new())
                }
            },
        };
        info!(backend = backend.describe(), "Loading settings");
        let mut settings = SettingsStore::new(backend, self.embedding)?;
        settings.initialize().await;

        let logging = if self.console_logging {
            match init_logging(LogLevel::default()) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(error = %e, "Console logging unavailable");
                    LogHandle::disabled()
                }
            }
        } else {
            LogHandle::disabled()
        };

        let (input_tx, input_rx) = input_channel();
        let host = TokioHost::new(input_tx.clone());
        let controller = ConnectionController::new(config, settings, factory, host, input_tx);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let runtime = SessionRuntime::new(controller, input_rx, command_rx, event_tx, logging);
        let handle = RuntimeHandle {
            commands: command_tx,
            events: Some(event_rx),
            task: None,
        };
        Ok((runtime, handle))
    }

    /// Build the runtime and spawn its loop on the current `LocalSet`
    pub async fn build_and_start(self) -> RuntimeResult<RuntimeHandle> {
        let (runtime, mut handle) = self.build().await?;
        handle.task = Some(tokio::task::spawn_local(runtime.run()));
        info!("Session runtime started");
        Ok(handle)
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running session runtime
pub struct RuntimeHandle {
    commands: CommandSender,
    events: Option<AppEventReceiver>,
    task: Option<JoinHandle<RuntimeResult<()>>>,
}

impl RuntimeHandle {
    fn send(&self, command: RuntimeCommand) -> RuntimeResult<()> {
        self.commands
            .send(command)
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    pub fn connect(&self) -> RuntimeResult<()> {
        self.send(RuntimeCommand::Connect)
    }

    pub fn disconnect(&self) -> RuntimeResult<()> {
        self.send(RuntimeCommand::Disconnect)
    }

    pub fn cancel_reconnect(&self) -> RuntimeResult<()> {
        self.send(RuntimeCommand::CancelReconnect)
    }

    pub fn approve_server(&self) -> RuntimeResult<()> {
        self.send(RuntimeCommand::ApproveServer)
    }

    pub fn reject_server(&self) -> RuntimeResult<()> {
        self.send(RuntimeCommand::RejectServer)
    }

    pub fn set_credential(
        &self,
        kind: CredentialKind,
        value: impl Into<String>,
    ) -> RuntimeResult<()> {
        self.send(RuntimeCommand::SetCredential {
            kind,
            value: value.into(),
        })
    }

    pub fn submit_credentials(&self) -> RuntimeResult<()> {
        self.send(RuntimeCommand::SubmitCredentials)
    }

    pub fn write_setting(&self, name: impl Into<String>, value: SettingValue) -> RuntimeResult<()> {
        self.send(RuntimeCommand::WriteSetting {
            name: name.into(),
            value,
        })
    }

    pub fn erase_setting(&self, name: impl Into<String>) -> RuntimeResult<()> {
        self.send(RuntimeCommand::EraseSetting { name: name.into() })
    }

    pub fn hide_status(&self) -> RuntimeResult<()> {
        self.send(RuntimeCommand::HideStatus)
    }

    /// Ask the runtime for its current state
    pub async fn snapshot(&self) -> RuntimeResult<RuntimeSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(RuntimeCommand::Snapshot(tx))?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Take the app event receiver for use elsewhere
    pub fn take_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.events.take()
    }

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.events.as_mut()?.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<AppEvent> {
        self.events.as_mut()?.try_recv().ok()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the runtime and wait for its loop to exit
    pub async fn shutdown(mut self) -> RuntimeResult<()> {
        let task = self.task.take().ok_or(RuntimeError::NotRunning)?;
        let _ = self.send(RuntimeCommand::Shutdown);
        task.await.map_err(|e| RuntimeError::Task {
            reason: e.to_string(),
        })?
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
