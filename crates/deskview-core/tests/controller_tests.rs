//! Integration tests for the connection controller
//!
//! These drive a controller through its public operations and queued session
//! events, using the mock host and scripted sessions from the `testing`
//! module, and check state transitions, status messages and session calls.

use core::time::Duration;
use deskview_core::testing::{Harness, ProbeSupport, ScriptedSessionFactory, SessionCall};
use deskview_core::*;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn map(pairs: &[(&str, SettingValue)]) -> SettingsMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Embedding defaults that keep the viewer from connecting on start
fn manual_defaults(extra: &[(&str, SettingValue)]) -> EmbeddingConfig {
    let mut defaults = map(&[(names::AUTOCONNECT, false.into())]);
    defaults.extend(map(extra));
    EmbeddingConfig {
        defaults,
        ..EmbeddingConfig::default()
    }
}

fn started(embedding: EmbeddingConfig) -> Harness {
    let mut h = Harness::new(embedding);
    h.controller.start().unwrap();
    h.events();
    h
}

fn connected(embedding: EmbeddingConfig) -> Harness {
    let mut h = started(embedding);
    h.controller.connect().unwrap();
    h.emit(SessionEvent::Connected);
    assert_eq!(h.controller.state(), ConnectionState::Connected);
    h.events();
    h
}

fn shown(events: &[AppEvent]) -> Vec<StatusMessage> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::StatusShown { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn transitions(events: &[AppEvent]) -> Vec<(ConnectionState, ConnectionState)> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Connecting
// ----------------------------------------------------------------------------

#[test]
fn test_connect_without_host_uses_page_origin() {
    let mut h = started(manual_defaults(&[(names::HOST, "".into())]));
    assert_eq!(h.controller.state(), ConnectionState::Init);

    h.controller.connect().unwrap();

    assert_eq!(h.controller.state(), ConnectionState::Connecting);
    let created = h.log.last_created().unwrap();
    assert_eq!(created.target.as_str(), "wss://viewer.example/websockify");
    assert_eq!(
        transitions(&h.events()),
        vec![(ConnectionState::Init, ConnectionState::Connecting)]
    );
}

#[test]
fn test_explicit_host_and_port() {
    let mut h = started(manual_defaults(&[
        (names::HOST, "desk.internal".into()),
        (names::PORT, SettingValue::from(6080u16)),
        (names::ENCRYPT, false.into()),
        (names::PATH, "ws".into()),
    ]));
    h.controller.connect().unwrap();
    let created = h.log.last_created().unwrap();
    assert_eq!(created.target.as_str(), "ws://desk.internal:6080/ws");
    assert!(created.options.shared);
}

#[test]
fn test_default_port_ignores_page_scheme_port() {
    let mut h = started(manual_defaults(&[]));
    assert_eq!(
        h.controller.read_setting(names::PORT),
        Some(SettingValue::from(5900u16))
    );

    h.controller.connect().unwrap();
    let created = h.log.last_created().unwrap();
    assert_eq!(created.target.as_str(), "wss://viewer.example:5900/websockify");
}

#[test]
fn test_start_autoconnects_by_default() {
    let mut h = Harness::new(EmbeddingConfig::default());
    h.controller.start().unwrap();
    assert_eq!(h.controller.state(), ConnectionState::Connecting);
    assert_eq!(h.log.created_count(), 1);
    assert!(!h.events().contains(&AppEvent::ConnectPanelRequested));
}

#[test]
fn test_start_without_autoconnect_requests_connect_panel() {
    let mut h = Harness::new(manual_defaults(&[]));
    h.controller.start().unwrap();
    assert_eq!(h.controller.state(), ConnectionState::Init);
    assert!(h.events().contains(&AppEvent::ConnectPanelRequested));
    assert_eq!(h.log.created_count(), 0);
}

#[test]
fn test_second_connect_is_a_no_op() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.controller.connect().unwrap();
    assert_eq!(h.log.created_count(), 1);

    h.emit(SessionEvent::Connected);
    h.controller.connect().unwrap();
    assert_eq!(h.log.created_count(), 1);
    assert_eq!(h.controller.state(), ConnectionState::Connected);
}

#[test]
fn test_session_construction_failure() {
    let mut h = Harness::build(
        SessionControlConfig::testing(),
        manual_defaults(&[]),
        MemoryBackend::new(),
        ScriptedSessionFactory::failing("socket refused"),
    );
    h.controller.start().unwrap();
    h.events();

    let err = h.controller.connect().unwrap_err();
    assert!(matches!(err, DeskviewError::Session(SessionError::Construction { .. })));
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);

    let status = h.controller.status().unwrap();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.text.starts_with("Failed to connect to server"));
    assert!(status.text.contains("socket refused"));

    let events = h.events();
    assert_eq!(
        transitions(&events),
        vec![
            (ConnectionState::Init, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Disconnected),
        ]
    );
    assert!(events.contains(&AppEvent::ConnectPanelRequested));
    assert!(h.controller.session_id().is_none());
}

#[test]
fn test_malformed_host_is_reported() {
    let mut h = started(manual_defaults(&[(names::HOST, "bad host".into())]));
    let err = h.controller.connect().unwrap_err();
    assert!(matches!(err, DeskviewError::Target(_)));
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert_eq!(h.log.created_count(), 0);
}

#[test]
fn test_connected_session_is_focused_and_announced() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.emit(SessionEvent::Connected);

    assert!(!h.controller.is_reconnect_inhibited());
    assert!(h.log.calls().contains(&SessionCall::Focus(1)));
    let status = h.controller.status().unwrap();
    assert_eq!(status.text, "Connected (encrypted) to viewer.example");
    assert_eq!(status.kind, StatusKind::Normal);
}

#[test]
fn test_session_options_follow_settings() {
    let embedding = EmbeddingConfig {
        mandatory: map(&[(names::VIEW_ONLY, true.into())]),
        page_url: Some(
            "https://viewer.example/vnc.html?quality=12&resize=remote#repeaterID=ID:42".into(),
        ),
        ..manual_defaults(&[(names::SHARED, false.into())])
    };
    let mut h = started(embedding);
    h.controller.connect().unwrap();

    let options = h.log.last_created().unwrap().options;
    assert!(!options.shared);
    assert_eq!(options.repeater_id, "ID:42");
    assert!(options.display.view_only);
    assert_eq!(options.display.resize, ResizeMode::Remote);
    assert_eq!(options.display.quality_level, 9);
    assert_eq!(options.display.compression_level, 2);
}

// ----------------------------------------------------------------------------
// Disconnecting & Reconnecting
// ----------------------------------------------------------------------------

#[test]
fn test_unclean_disconnect_without_reconnect_shows_reason() {
    let mut h = connected(manual_defaults(&[]));
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: Some("boom".into()),
    });

    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    let status = h.controller.status().unwrap();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.text.contains("boom"));
    assert_eq!(status.text, "Something went wrong, connection is closed: boom");
    assert!(h.controller.session_id().is_none());

    let events = h.events();
    assert!(events.contains(&AppEvent::ConnectPanelRequested));
    assert!(events.contains(&AppEvent::TitleChanged {
        title: PAGE_TITLE.to_string()
    }));
}

#[test]
fn test_clean_disconnect_after_user_request() {
    let mut h = connected(manual_defaults(&[]));
    h.controller.disconnect();
    assert_eq!(h.controller.state(), ConnectionState::Disconnecting);
    assert!(h.controller.is_reconnect_inhibited());
    assert!(h.log.calls().contains(&SessionCall::Disconnect(1)));

    h.emit(SessionEvent::Disconnected {
        clean: true,
        reason: None,
    });
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    let status = h.controller.status().unwrap();
    assert_eq!(status.text, "Disconnected");
    assert_eq!(status.kind, StatusKind::Normal);
    assert!(shown(&h.events()).iter().all(|m| m.kind != StatusKind::Error));
}

#[test]
fn test_manual_disconnect_inhibits_reconnect() {
    let mut h = connected(manual_defaults(&[(names::RECONNECT, true.into())]));
    h.controller.disconnect();
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: Some("reset by peer".into()),
    });

    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert!(!h.controller.is_reconnect_scheduled());
    assert_eq!(h.log.created_count(), 1);
}

#[test]
fn test_connected_event_queued_before_disconnect_is_ignored() {
    let mut h = started(manual_defaults(&[
        (names::RECONNECT, true.into()),
        (names::RECONNECT_DELAY, SettingValue::from(100u16)),
    ]));
    h.controller.connect().unwrap();
    let id = h.log.latest_session_id().unwrap();
    h.log.emit(id, SessionEvent::Connected);

    h.controller.disconnect();
    h.pump();

    assert_eq!(h.controller.state(), ConnectionState::Disconnecting);
    assert!(h.controller.is_reconnect_inhibited());
    assert_eq!(h.controller.latency(), LatencyReading::Unavailable);
    assert!(h.controller.host().pending_probes().is_empty());
    assert!(h.controller.host().timer_with_delay(Duration::from_millis(100)).is_none());

    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: Some("boom".into()),
    });
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert!(!h.controller.is_reconnect_scheduled());
    assert_eq!(h.log.created_count(), 1);
}

#[test]
fn test_pending_inputs_are_handled_in_one_pass() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    let id = h.log.latest_session_id().unwrap();
    h.log.emit(id, SessionEvent::Connected);
    h.log.emit(
        id,
        SessionEvent::DesktopName {
            name: "build-box".into(),
        },
    );

    assert_eq!(h.pump(), 2);
    assert_eq!(h.pump(), 0);
    assert_eq!(h.controller.state(), ConnectionState::Connected);
}

#[test]
fn test_reconnect_is_inhibited_before_first_connection() {
    let mut h = Harness::new(manual_defaults(&[
        (names::AUTOCONNECT, true.into()),
        (names::RECONNECT, true.into()),
    ]));
    h.controller.start().unwrap();
    assert!(h.controller.is_reconnect_inhibited());

    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: Some("refused".into()),
    });
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert_eq!(
        h.controller.status().unwrap().text,
        "Failed to connect to server: refused"
    );
    assert!(!h.controller.is_reconnect_scheduled());
}

#[test]
fn test_unclean_disconnect_schedules_reconnect_with_remembered_password() {
    let mut h = started(manual_defaults(&[
        (names::RECONNECT, true.into()),
        (names::RECONNECT_DELAY, SettingValue::from(250u16)),
    ]));
    h.controller.connect().unwrap();
    h.emit(SessionEvent::CredentialsRequired {
        kinds: CredentialKinds::password_only(),
    });
    h.controller.set_credential(CredentialKind::Password, "pw").unwrap();
    h.controller.submit_credentials().unwrap();
    h.emit(SessionEvent::Connected);

    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: Some("lost".into()),
    });
    assert_eq!(h.controller.state(), ConnectionState::Reconnecting);
    assert!(h.controller.is_reconnect_scheduled());
    assert_eq!(h.controller.status().unwrap().kind, StatusKind::Error);

    let timer = h
        .controller
        .host()
        .timer_with_delay(Duration::from_millis(250))
        .unwrap();
    h.fire(timer);

    assert_eq!(h.controller.state(), ConnectionState::Connecting);
    assert_eq!(h.log.created_count(), 2);
    let options = h.log.last_created().unwrap().options;
    assert_eq!(options.credentials.password.as_deref(), Some("pw"));
    assert!(h.controller.status().is_none());
}

#[test]
fn test_cancel_reconnect_discards_timer() {
    let mut h = connected(manual_defaults(&[
        (names::RECONNECT, true.into()),
        (names::RECONNECT_DELAY, SettingValue::from(250u16)),
    ]));
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: None,
    });
    let timer = h
        .controller
        .host()
        .timer_with_delay(Duration::from_millis(250))
        .unwrap();
    h.events();

    h.controller.cancel_reconnect();
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert!(!h.controller.host().is_armed(timer));
    assert!(h.events().contains(&AppEvent::ConnectPanelRequested));

    // A late delivery of the cancelled timer must not reconnect
    h.controller.handle(ControllerInput::TimerFired(timer));
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert_eq!(h.log.created_count(), 1);
}

#[test]
fn test_disconnect_while_reconnecting_cancels() {
    let mut h = connected(manual_defaults(&[(names::RECONNECT, true.into())]));
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: None,
    });
    assert_eq!(h.controller.state(), ConnectionState::Reconnecting);

    h.controller.disconnect();
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert!(!h.controller.is_reconnect_scheduled());
}

#[test]
fn test_cancel_while_connecting_tears_down_session() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.controller.cancel_reconnect();

    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert!(h.log.calls().contains(&SessionCall::Disconnect(1)));

    // Events from the abandoned session are dropped
    h.emit_from(1, SessionEvent::Connected);
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
}

#[test]
fn test_events_from_previous_session_are_dropped() {
    let mut h = connected(manual_defaults(&[(names::RECONNECT, true.into())]));
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: None,
    });
    let timer = h
        .controller
        .host()
        .timer_with_delay(Duration::from_millis(5000))
        .unwrap();
    h.fire(timer);
    assert_eq!(h.controller.session_id(), Some(2));

    h.emit_from(1, SessionEvent::Connected);
    assert_eq!(h.controller.state(), ConnectionState::Connecting);

    h.emit_from(2, SessionEvent::Connected);
    assert_eq!(h.controller.state(), ConnectionState::Connected);
}

#[test]
fn test_permission_errors_are_suppressed() {
    let mut h = connected(manual_defaults(&[]));
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: Some("Permission error".into()),
    });
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
    assert!(shown(&h.events()).iter().all(|m| m.kind != StatusKind::Error));
    assert_eq!(h.controller.status().unwrap().text, "Disconnected");
}

#[test]
fn test_suppression_can_be_disabled() {
    let config = SessionControlConfig {
        suppression: SuppressionPolicy::disabled(),
        ..SessionControlConfig::testing()
    };
    let mut h = Harness::build(
        config,
        manual_defaults(&[]),
        MemoryBackend::new(),
        ScriptedSessionFactory::new(),
    );
    h.controller.start().unwrap();
    h.controller.connect().unwrap();
    h.emit(SessionEvent::Connected);
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: Some("Permission error".into()),
    });
    assert_eq!(h.controller.status().unwrap().kind, StatusKind::Error);
}

// ----------------------------------------------------------------------------
// Security
// ----------------------------------------------------------------------------

#[test]
fn test_password_prompt_forwards_only_password() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.events();

    h.emit(SessionEvent::CredentialsRequired {
        kinds: CredentialKinds::password_only(),
    });
    let prompt = *h.controller.pending_credentials().unwrap();
    assert!(prompt.kinds.password && !prompt.kinds.username);
    assert_eq!(prompt.focus, Some(CredentialKind::Password));
    assert_eq!(h.controller.credential_field(CredentialKind::Username), None);
    assert!(h.controller.set_credential(CredentialKind::Username, "alice").is_err());

    let events = h.events();
    assert!(events.contains(&AppEvent::CredentialPrompt { prompt }));
    assert_eq!(shown(&events)[0].text, "Credentials are required");

    h.controller.set_credential(CredentialKind::Password, "secret").unwrap();
    h.controller.submit_credentials().unwrap();

    assert_eq!(
        h.log.calls(),
        vec![SessionCall::SendCredentials(1, Credentials::password("secret"))]
    );
    assert_eq!(h.controller.credential_field(CredentialKind::Password), None);
    assert!(h.controller.pending_credentials().is_none());
    assert!(h.events().contains(&AppEvent::CredentialPromptClosed));
}

#[test]
fn test_server_identity_approval() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.events();

    h.emit(SessionEvent::ServerVerification {
        key_type: "RSA".into(),
        public_key: b"abc".to_vec(),
    });
    let expected = FingerprintPrompt {
        key_type: "RSA".into(),
        fingerprint: "a9-99-3e-36-47-06-81-6a".into(),
    };
    assert_eq!(h.controller.pending_fingerprint(), Some(&expected));
    assert!(h
        .events()
        .contains(&AppEvent::FingerprintPrompt { prompt: expected }));

    h.controller.approve_server().unwrap();
    assert!(h.log.calls().contains(&SessionCall::ApproveServerIdentity(1)));
    assert!(h.controller.approve_server().is_err());
    assert_eq!(h.controller.state(), ConnectionState::Connecting);
}

#[test]
fn test_server_identity_rejection_disconnects() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.emit(SessionEvent::ServerVerification {
        key_type: "RSA".into(),
        public_key: vec![1, 2, 3],
    });

    h.controller.reject_server().unwrap();
    assert_eq!(h.controller.state(), ConnectionState::Disconnecting);
    assert!(h.log.calls().contains(&SessionCall::Disconnect(1)));

    h.emit(SessionEvent::Disconnected {
        clean: true,
        reason: None,
    });
    assert_eq!(h.controller.state(), ConnectionState::Disconnected);
}

#[test]
fn test_missing_fingerprint_prompt_rejects_server() {
    let mut config = SessionControlConfig::testing();
    config.view.fingerprint_prompt = false;
    let mut h = Harness::build(
        config,
        manual_defaults(&[]),
        MemoryBackend::new(),
        ScriptedSessionFactory::new(),
    );
    h.controller.start().unwrap();
    h.controller.connect().unwrap();
    h.emit(SessionEvent::ServerVerification {
        key_type: "RSA".into(),
        public_key: vec![1, 2, 3],
    });

    assert!(h.controller.pending_fingerprint().is_none());
    assert_eq!(h.controller.state(), ConnectionState::Disconnecting);
    assert!(h.log.calls().contains(&SessionCall::Disconnect(1)));
    assert!(!h.log.calls().contains(&SessionCall::ApproveServerIdentity(1)));
}

#[test]
fn test_security_failure_overrides_and_expires() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.emit(SessionEvent::SecurityFailure {
        reason: Some("Authentication failed".into()),
    });
    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: None,
    });

    let status = h.controller.status().unwrap().clone();
    assert!(status.security);
    assert_eq!(
        status.text,
        "New connection has been rejected with reason: Authentication failed"
    );

    let hold = SessionControlConfig::testing().status.security_hold();
    let timer = h.controller.host().timer_with_delay(hold).unwrap();
    h.fire(timer);
    assert!(h.controller.status().is_none());
    assert!(h.events().contains(&AppEvent::StatusHidden));
}

#[test]
fn test_teardown_closes_open_prompts() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.emit(SessionEvent::CredentialsRequired {
        kinds: CredentialKinds::both(),
    });
    h.events();

    h.emit(SessionEvent::Disconnected {
        clean: false,
        reason: None,
    });
    assert!(h.controller.pending_credentials().is_none());
    assert!(h.events().contains(&AppEvent::CredentialPromptClosed));
    assert!(h.controller.submit_credentials().is_err());
}

// ----------------------------------------------------------------------------
// Desktop Name, Status & Settings
// ----------------------------------------------------------------------------

#[test]
fn test_desktop_name_sets_title() {
    let mut h = started(manual_defaults(&[]));
    h.controller.connect().unwrap();
    h.emit(SessionEvent::DesktopName {
        name: "build-box".into(),
    });
    assert!(h.events().contains(&AppEvent::DesktopNameChanged {
        name: "build-box".into(),
        title: "build-box - deskview".into(),
    }));

    h.emit(SessionEvent::Connected);
    assert_eq!(
        h.controller.status().unwrap().text,
        "Connected (encrypted) to build-box"
    );
    assert_eq!(h.controller.title(), "build-box - deskview");

    h.controller.disconnect();
    h.emit(SessionEvent::Disconnected {
        clean: true,
        reason: None,
    });
    assert_eq!(h.controller.title(), PAGE_TITLE);
    assert_eq!(h.controller.desktop_name(), None);
}

#[test]
fn test_transient_status_hides_after_hold() {
    let mut h = connected(manual_defaults(&[]));
    let hold = SessionControlConfig::testing().status.normal_hold();
    let timer = h.controller.host().timer_with_delay(hold).unwrap();
    h.fire(timer);
    assert!(h.controller.status().is_none());
    assert_eq!(h.events(), vec![AppEvent::StatusHidden]);
}

#[test]
fn test_forced_settings_are_announced_and_locked() {
    let embedding = EmbeddingConfig {
        mandatory: map(&[(names::VIEW_ONLY, true.into())]),
        ..manual_defaults(&[])
    };
    let mut h = Harness::new(embedding);
    h.controller.start().unwrap();

    assert!(h.events().contains(&AppEvent::SettingForced {
        name: names::VIEW_ONLY.into(),
        value: SettingValue::Bool(true),
    }));
    assert!(h.controller.settings().is_forced(names::VIEW_ONLY));
    assert!(!h.controller.write_setting(names::VIEW_ONLY, false.into()));
    assert!(!h.controller.erase_setting(names::VIEW_ONLY));
    assert_eq!(
        h.controller.read_setting(names::VIEW_ONLY),
        Some(SettingValue::Bool(true))
    );
}

#[test]
fn test_repeated_setting_write_persists_once() {
    let mut h = started(manual_defaults(&[]));
    assert!(h.controller.write_setting(names::QUALITY, SettingValue::from(9u16)));
    assert!(h.controller.write_setting(names::QUALITY, SettingValue::from(9u16)));
    assert_eq!(h.controller.host_mut().run_tasks(), 1);
    assert_eq!(h.backend.write_count(), 1);
    assert_eq!(h.backend.stored(names::QUALITY), Some(SettingValue::Number(9.0)));

    assert!(h.controller.erase_setting(names::QUALITY));
    h.controller.host_mut().run_tasks();
    assert_eq!(h.backend.stored(names::QUALITY), None);
}

#[test]
fn test_logging_setting_selects_level() {
    let embedding = EmbeddingConfig {
        page_url: Some("https://viewer.example/vnc.html#logging=debug".into()),
        ..manual_defaults(&[])
    };
    let mut h = started(embedding);
    assert_eq!(h.controller.log_level(), LogLevel::Debug);

    assert!(h.controller.write_setting(names::LOGGING, "error".into()));
    assert_eq!(h.controller.log_level(), LogLevel::Error);
    assert!(!h.controller.write_setting(names::LOGGING, "chatty".into()));
}

#[test]
fn test_sessions_without_probes_publish_unavailable() {
    let mut h = Harness::build(
        SessionControlConfig::testing(),
        manual_defaults(&[]),
        MemoryBackend::new(),
        ScriptedSessionFactory::new().with_probes(ProbeSupport::None),
    );
    h.controller.start().unwrap();
    h.controller.connect().unwrap();
    h.emit(SessionEvent::Connected);

    assert!(h.controller.host().pending_probes().is_empty());
    assert_eq!(h.controller.latency(), LatencyReading::Unavailable);
    assert!(h
        .events()
        .contains(&AppEvent::latency(LatencyReading::Unavailable)));
}
