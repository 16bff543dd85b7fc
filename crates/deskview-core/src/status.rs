//! Status message display with precedence rules
//!
//! Only one status is visible at a time. A visible error blocks every later
//! message except a security error, so the first error stays on screen until
//! dismissed. A visible warning blocks later normal messages. Transient
//! messages hide themselves after a hold time; ordinary errors never do.

use serde::Serialize;
use tracing::debug;

use crate::config::StatusConfig;
use crate::host::{Host, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Normal,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
    /// Peer-reported security failure; overrides any visible status
    pub security: bool,
}

impl StatusMessage {
    pub fn normal(text: impl Into<String>) -> Self {
        Self::new(text, StatusKind::Normal)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, StatusKind::Info)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(text, StatusKind::Warning)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, StatusKind::Error)
    }

    pub fn security(text: impl Into<String>) -> Self {
        Self {
            security: true,
            ..Self::new(text, StatusKind::Error)
        }
    }

    fn new(text: impl Into<String>, kind: StatusKind) -> Self {
        Self {
            text: text.into(),
            kind,
            security: false,
        }
    }
}

#[derive(Debug)]
pub struct StatusBoard {
    config: StatusConfig,
    visible: Option<StatusMessage>,
    hide_timer: Option<TimerId>,
}

impl StatusBoard {
    pub fn new(config: StatusConfig) -> Self {
        Self {
            config,
            visible: None,
            hide_timer: None,
        }
    }

    /// Display a message unless the visible one takes precedence
    ///
    /// Returns whether the message is now visible.
    pub fn show<H: Host + ?Sized>(&mut self, message: StatusMessage, host: &mut H) -> bool {
        if let Some(current) = &self.visible {
            let blocked = !message.security
                && (current.kind == StatusKind::Error
                    || (current.kind == StatusKind::Warning && message.kind == StatusKind::Normal));
            if blocked {
                debug!(
                    visible = ?current.kind,
                    dropped = %message.text,
                    "Status blocked by visible message"
                );
                return false;
            }
        }

        self.cancel_hide(host);
        let hold = if message.security {
            Some(self.config.security_hold())
        } else if message.kind == StatusKind::Error {
            None
        } else {
            Some(self.config.normal_hold())
        };
        self.hide_timer = hold.map(|delay| host.set_timer(delay));
        self.visible = Some(message);
        true
    }

    /// Dismiss the visible message; returns whether one was visible
    pub fn hide<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        self.cancel_hide(host);
        self.visible.take().is_some()
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.hide_timer == Some(id)
    }

    /// Handle the hide timer; returns whether a message was hidden
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        if self.hide_timer != Some(id) {
            return false;
        }
        self.hide_timer = None;
        self.visible.take().is_some()
    }

    pub fn visible(&self) -> Option<&StatusMessage> {
        self.visible.as_ref()
    }

    fn cancel_hide<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(timer) = self.hide_timer.take() {
            host.clear_timer(timer);
        }
    }
}
