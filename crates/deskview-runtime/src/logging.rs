//! Console logging setup
//!
//! The controller derives its log level from the `logging` setting. The
//! subscriber installed here keeps a reload handle so that level can change
//! while the runtime runs. An explicit `RUST_LOG` takes precedence and
//! disables reloading.

use crate::errors::{RuntimeError, RuntimeResult};
use deskview_core::LogLevel;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle for adjusting the installed log level
#[derive(Clone, Default)]
pub struct LogHandle {
    reload: Option<reload::Handle<LevelFilter, Registry>>,
    level: Option<LogLevel>,
}

impl LogHandle {
    /// Handle that ignores level changes
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn level(&self) -> Option<LogLevel> {
        self.level
    }

    /// Apply a new level; returns `true` if the filter changed
    pub fn set_level(&mut self, level: LogLevel) -> bool {
        if self.level == Some(level) {
            return false;
        }
        let Some(handle) = &self.reload else {
            return false;
        };
        match handle.modify(|filter| *filter = level.to_level_filter()) {
            Ok(()) => {
                self.level = Some(level);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Log level not updated");
                false
            }
        }
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("reloadable", &self.reload.is_some())
            .field("level", &self.level)
            .finish()
    }
}

/// Install the global console subscriber
///
/// Fails if a global subscriber is already set.
pub fn init_logging(level: LogLevel) -> RuntimeResult<LogHandle> {
    let failed = |e: tracing_subscriber::util::TryInitError| RuntimeError::Logging {
        reason: e.to_string(),
    };

    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(failed)?;
        return Ok(LogHandle::disabled());
    }

    let (filter, handle) = reload::Layer::new(level.to_level_filter());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(failed)?;
    Ok(LogHandle {
        reload: Some(handle),
        level: Some(level),
    })
}
