//! Events published to the view layer

use serde::Serialize;

use crate::controller::ConnectionState;
use crate::latency::{ConnectionQuality, LatencyReading};
use crate::security::{CredentialPrompt, FingerprintPrompt};
use crate::settings::SettingValue;
use crate::status::StatusMessage;

/// Everything the view renders, in the order it happened
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    StatusShown {
        message: StatusMessage,
    },
    StatusHidden,
    LatencyUpdated {
        reading: LatencyReading,
        quality: ConnectionQuality,
    },
    FingerprintPrompt {
        prompt: FingerprintPrompt,
    },
    FingerprintPromptClosed,
    CredentialPrompt {
        prompt: CredentialPrompt,
    },
    CredentialPromptClosed,
    /// Setting locked by the embedding page; its control must be disabled
    SettingForced {
        name: String,
        value: SettingValue,
    },
    DesktopNameChanged {
        name: String,
        title: String,
    },
    /// Window title reset after the session ended
    TitleChanged {
        title: String,
    },
    /// Show the connect controls again
    ConnectPanelRequested,
}

impl AppEvent {
    pub fn latency(reading: LatencyReading) -> Self {
        AppEvent::LatencyUpdated {
            reading,
            quality: reading.quality(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppEvent::StateChanged { .. } => "state_changed",
            AppEvent::StatusShown { .. } => "status_shown",
            AppEvent::StatusHidden => "status_hidden",
            AppEvent::LatencyUpdated { .. } => "latency_updated",
            AppEvent::FingerprintPrompt { .. } => "fingerprint_prompt",
            AppEvent::FingerprintPromptClosed => "fingerprint_prompt_closed",
            AppEvent::CredentialPrompt { .. } => "credential_prompt",
            AppEvent::CredentialPromptClosed => "credential_prompt_closed",
            AppEvent::SettingForced { .. } => "setting_forced",
            AppEvent::DesktopNameChanged { .. } => "desktop_name_changed",
            AppEvent::TitleChanged { .. } => "title_changed",
            AppEvent::ConnectPanelRequested => "connect_panel_requested",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let event = AppEvent::latency(LatencyReading::Millis(42));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "latency_updated");
        assert_eq!(json["quality"], "excellent");
        assert_eq!(json["reading"]["millis"], 42);
        assert_eq!(event.kind(), "latency_updated");

        let json = serde_json::to_value(AppEvent::StatusHidden).unwrap();
        assert_eq!(json["type"], "status_hidden");
    }
}
