//! Session Control Configuration
//!
//! Tunables for the controller and its components. Everything here is plain
//! serde data so an embedding page can hand it over as JSON.

use core::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::security::FingerprintDigest;

// ----------------------------------------------------------------------------
// Latency Configuration
// ----------------------------------------------------------------------------

/// Configuration for the latency monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Interval between probe cycles in milliseconds
    pub interval_ms: u64,
    /// Per-probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Number of successful samples averaged into the published value
    pub window_capacity: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            probe_timeout_ms: 1500,
            window_capacity: 20,
        }
    }
}

impl LatencyConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Status Display Configuration
// ----------------------------------------------------------------------------

/// How long transient status messages stay visible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Hold time for normal, info and warning messages
    pub normal_hold_ms: u64,
    /// Hold time for security failure messages
    pub security_hold_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            normal_hold_ms: 1500,
            security_hold_ms: 5000,
        }
    }
}

impl StatusConfig {
    pub fn normal_hold(&self) -> Duration {
        Duration::from_millis(self.normal_hold_ms)
    }

    pub fn security_hold(&self) -> Duration {
        Duration::from_millis(self.security_hold_ms)
    }
}

// ----------------------------------------------------------------------------
// Error Suppression Policy
// ----------------------------------------------------------------------------

/// Transport error messages hidden from the end user
///
/// Matching is a case-insensitive substring test against the full message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionPolicy {
    pub enabled: bool,
    pub patterns: Vec<String>,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![
                "permission error".to_string(),
                "permissions check failed".to_string(),
            ],
        }
    }
}

impl SuppressionPolicy {
    /// Policy that never hides anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            patterns: Vec::new(),
        }
    }

    /// Check whether a message should stay hidden from the user
    pub fn suppresses(&self, message: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let message = message.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && message.contains(&pattern.to_lowercase()))
    }
}

// ----------------------------------------------------------------------------
// Fingerprint & View Configuration
// ----------------------------------------------------------------------------

/// Fingerprint rendering configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FingerprintConfig {
    pub digest: FingerprintDigest,
}

/// Affordances the view layer can present
///
/// A server identity request that arrives while the fingerprint prompt is
/// unavailable is treated as a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewCapabilities {
    pub fingerprint_prompt: bool,
    pub credential_prompt: bool,
}

impl Default for ViewCapabilities {
    fn default() -> Self {
        Self {
            fingerprint_prompt: true,
            credential_prompt: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a [`ConnectionController`](crate::ConnectionController)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionControlConfig {
    pub latency: LatencyConfig,
    pub status: StatusConfig,
    pub suppression: SuppressionPolicy,
    pub fingerprint: FingerprintConfig,
    pub view: ViewCapabilities,
}

impl SessionControlConfig {
    /// Configuration with short, round timings for tests
    pub fn testing() -> Self {
        Self {
            latency: LatencyConfig {
                interval_ms: 1000,
                probe_timeout_ms: 500,
                window_capacity: 5,
            },
            status: StatusConfig {
                normal_hold_ms: 100,
                security_hold_ms: 300,
            },
            ..Self::default()
        }
    }

    /// Parse configuration from the embedding page's JSON
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::DeskviewError::config_error(format!("invalid config: {}", e)))
    }
}

// ----------------------------------------------------------------------------
// Log Level
// ----------------------------------------------------------------------------

/// Log verbosity selected through the `logging` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warn
    }
}

impl LogLevel {
    /// All levels in the order offered to the user
    pub const ALL: [LogLevel; 4] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    /// Parse the `logging` setting value; unknown values yield `None`
    pub fn from_setting(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }

    pub fn to_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}
