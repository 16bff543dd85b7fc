//! End-to-end tests for the tokio session runtime
//!
//! Sessions are scripted, time is paused, and everything runs on a LocalSet
//! the way an embedding application would drive it.

use deskview_core::testing::{ProbeSupport, ScriptedSessionFactory, SessionCall, SessionLog};
use deskview_core::*;
use deskview_runtime::{RuntimeBuilder, RuntimeError, RuntimeHandle};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

fn run_local<F: Future<Output = ()>>(test: F) -> impl Future<Output = ()> {
    async move { LocalSet::new().run_until(test).await }
}

fn embedding(autoconnect: bool, extra: &[(&str, SettingValue)]) -> EmbeddingConfig {
    let mut defaults: SettingsMap = [
        (names::HOST.to_string(), SettingValue::from("remote.example")),
        (names::AUTOCONNECT.to_string(), SettingValue::Bool(autoconnect)),
    ]
    .into_iter()
    .collect();
    for (name, value) in extra {
        defaults.insert(name.to_string(), value.clone());
    }
    EmbeddingConfig {
        defaults,
        ..EmbeddingConfig::default()
    }
}

async fn start(
    embedding: EmbeddingConfig,
    backend: Rc<MemoryBackend>,
) -> (RuntimeHandle, SessionLog) {
    let factory = ScriptedSessionFactory::new().with_probes(ProbeSupport::Transport);
    let log = factory.log();
    let handle = RuntimeBuilder::new()
        .with_config(SessionControlConfig::testing())
        .with_embedding(embedding)
        .with_settings_backend(backend)
        .with_session_factory(Box::new(factory))
        .build_and_start()
        .await
        .expect("runtime starts");
    (handle, log)
}

/// Read events until one matches, failing after a generous virtual timeout
async fn wait_for<P: Fn(&AppEvent) -> bool>(handle: &mut RuntimeHandle, matches: P) -> AppEvent {
    let found = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match handle.next_event().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await;
    found.expect("expected event did not arrive")
}

fn entered(state: ConnectionState) -> impl Fn(&AppEvent) -> bool {
    move |event| matches!(event, AppEvent::StateChanged { to, .. } if *to == state)
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_autoconnect_and_latency_updates() {
    run_local(async {
        let (mut handle, log) = start(embedding(true, &[]), Rc::new(MemoryBackend::new())).await;

        wait_for(&mut handle, entered(ConnectionState::Connecting)).await;
        let created = log.last_created().expect("session created");
        assert_eq!(created.target.as_str(), "ws://remote.example:5900/websockify");

        log.emit(created.session_id, SessionEvent::Connected);
        wait_for(&mut handle, entered(ConnectionState::Connected)).await;

        let event = wait_for(&mut handle, |e| matches!(e, AppEvent::LatencyUpdated { .. })).await;
        assert_eq!(event, AppEvent::latency(LatencyReading::Millis(80)));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.latency, LatencyReading::Millis(80));
        assert_eq!(snapshot.quality, ConnectionQuality::Good);

        handle.shutdown().await.unwrap();
    })
    .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_connect_panel_without_autoconnect() {
    run_local(async {
        let (mut handle, log) = start(embedding(false, &[]), Rc::new(MemoryBackend::new())).await;

        wait_for(&mut handle, |e| matches!(e, AppEvent::ConnectPanelRequested)).await;
        assert_eq!(log.created_count(), 0);

        handle.connect().unwrap();
        wait_for(&mut handle, entered(ConnectionState::Connecting)).await;
        assert_eq!(log.created_count(), 1);
        handle.shutdown().await.unwrap();
    })
    .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_unclean_close_reconnects_after_delay() {
    run_local(async {
        let extra = [
            (names::RECONNECT, SettingValue::Bool(true)),
            (names::RECONNECT_DELAY, SettingValue::Number(500.0)),
        ];
        let (mut handle, log) = start(embedding(true, &extra), Rc::new(MemoryBackend::new())).await;

        wait_for(&mut handle, entered(ConnectionState::Connecting)).await;
        let first = log.latest_session_id().unwrap();
        log.emit(first, SessionEvent::Connected);
        wait_for(&mut handle, entered(ConnectionState::Connected)).await;

        log.emit(
            first,
            SessionEvent::Disconnected {
                clean: false,
                reason: Some("network dropped".into()),
            },
        );
        wait_for(&mut handle, entered(ConnectionState::Reconnecting)).await;
        wait_for(&mut handle, entered(ConnectionState::Connecting)).await;

        assert_eq!(log.created_count(), 2);
        assert_ne!(log.latest_session_id(), Some(first));
        handle.shutdown().await.unwrap();
    })
    .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_setting_writes_reach_backend() {
    run_local(async {
        let backend = Rc::new(MemoryBackend::new());
        let (handle, _log) = start(embedding(false, &[]), Rc::clone(&backend)).await;

        handle
            .write_setting(names::QUALITY, SettingValue::Number(3.0))
            .unwrap();
        handle.snapshot().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(backend.stored(names::QUALITY), Some(SettingValue::Number(3.0)));
        assert_eq!(backend.write_count(), 1);
        handle.shutdown().await.unwrap();
    })
    .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_shutdown_disconnects_live_session() {
    run_local(async {
        let (mut handle, log) = start(embedding(true, &[]), Rc::new(MemoryBackend::new())).await;
        wait_for(&mut handle, entered(ConnectionState::Connecting)).await;
        let id = log.latest_session_id().unwrap();
        log.emit(id, SessionEvent::Connected);
        wait_for(&mut handle, entered(ConnectionState::Connected)).await;

        handle.shutdown().await.unwrap();
        assert!(log
            .calls()
            .iter()
            .any(|call| matches!(call, SessionCall::Disconnect(session) if *session == id)));
    })
    .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_builder_requires_session_factory() {
    run_local(async {
        let result = RuntimeBuilder::new()
            .with_settings_backend(Rc::new(MemoryBackend::new()))
            .build_and_start()
            .await;
        assert!(matches!(
            result,
            Err(RuntimeError::Core(DeskviewError::Configuration { .. }))
        ));
    })
    .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_config_file_is_loaded() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskview.json");
        std::fs::write(&path, br#"{"latency": {"interval_ms": 750}}"#).unwrap();

        let (runtime, _handle) = RuntimeBuilder::new()
            .with_config_file(&path)
            .with_settings_backend(Rc::new(MemoryBackend::new()))
            .with_session_factory(Box::new(ScriptedSessionFactory::new()))
            .build()
            .await
            .unwrap();
        let config = runtime.controller().config();
        assert_eq!(config.latency.interval_ms, 750);
        assert_eq!(config.latency.probe_timeout_ms, 1500);
    })
    .await;
}
