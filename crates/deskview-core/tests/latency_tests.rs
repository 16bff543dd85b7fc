//! Latency monitor tests driven through a connected controller

use core::time::Duration;
use deskview_core::testing::{Harness, ProbeSupport, ScriptedSessionFactory};
use deskview_core::*;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn harness(probes: ProbeSupport) -> Harness {
    let embedding = EmbeddingConfig {
        defaults: [(names::AUTOCONNECT.to_string(), SettingValue::Bool(false))]
            .into_iter()
            .collect(),
        ..EmbeddingConfig::default()
    };
    let mut h = Harness::build(
        SessionControlConfig::testing(),
        embedding,
        MemoryBackend::new(),
        ScriptedSessionFactory::new().with_probes(probes),
    );
    h.controller.start().unwrap();
    h.controller.connect().unwrap();
    h
}

fn tick(h: &Harness) -> TimerId {
    let interval = SessionControlConfig::testing().latency.interval();
    h.controller.host().timer_with_delay(interval).unwrap()
}

fn probe_timeout(h: &Harness) -> TimerId {
    let timeout = SessionControlConfig::testing().latency.probe_timeout();
    h.controller.host().timer_with_delay(timeout).unwrap()
}

fn published(events: &[AppEvent]) -> Vec<LatencyReading> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::LatencyUpdated { reading, .. } => Some(*reading),
            _ => None,
        })
        .collect()
}

#[test]
fn test_timeout_does_not_poison_average() {
    let mut h = harness(ProbeSupport::Ping);
    h.log.script_pings([Ok(ms(50)), Ok(ms(999)), Ok(ms(60)), Ok(ms(70))]);
    h.emit(SessionEvent::Connected);
    h.events();

    // First probe fires immediately on connect
    let probe = h.only_pending_probe();
    h.complete_probe(probe);
    assert_eq!(h.controller.latency(), LatencyReading::Millis(50));

    // Second probe never answers
    let timer = tick(&h);
    h.fire(timer);
    let stuck = h.only_pending_probe();
    let timeout = probe_timeout(&h);
    h.fire(timeout);
    assert_eq!(h.controller.latency(), LatencyReading::Unavailable);
    assert!(h.controller.host().cancelled_probes().contains(&stuck));

    let timer = tick(&h);
    h.fire(timer);
    let probe = h.only_pending_probe();
    h.complete_probe(probe);

    let timer = tick(&h);
    h.fire(timer);
    let probe = h.only_pending_probe();
    h.complete_probe(probe);

    assert_eq!(h.controller.latency(), LatencyReading::Millis(60));
    assert_eq!(
        published(&h.events()),
        vec![
            LatencyReading::Millis(50),
            LatencyReading::Unavailable,
            LatencyReading::Millis(55),
            LatencyReading::Millis(60),
        ]
    );
    assert_eq!(h.controller.quality(), ConnectionQuality::Good);
}

#[test]
fn test_failed_probe_publishes_unavailable_only_for_that_cycle() {
    let mut h = harness(ProbeSupport::Ping);
    h.log.script_pings([
        Ok(ms(40)),
        Err(ProbeError::Failed {
            reason: "no pong".into(),
        }),
        Ok(ms(44)),
    ]);
    h.emit(SessionEvent::Connected);

    for _ in 0..3 {
        let probe = h.only_pending_probe();
        h.complete_probe(probe);
        let timer = tick(&h);
        h.fire(timer);
    }
    let readings = published(&h.events());
    assert_eq!(
        &readings[..3],
        &[
            LatencyReading::Millis(40),
            LatencyReading::Unavailable,
            LatencyReading::Millis(42),
        ]
    );
}

#[test]
fn test_tick_is_skipped_while_probe_in_flight() {
    let mut h = harness(ProbeSupport::Ping);
    h.emit(SessionEvent::Connected);
    let first = h.only_pending_probe();

    let timer = tick(&h);
    h.fire(timer);
    assert_eq!(h.controller.host().pending_probes(), vec![first]);
    // The interval timer is re-armed for the next cycle
    assert!(h.controller.host().is_armed(tick(&h)));
}

#[test]
fn test_disconnect_discards_in_flight_probe() {
    let mut h = harness(ProbeSupport::Ping);
    h.log.script_pings([Ok(ms(30))]);
    h.emit(SessionEvent::Connected);
    let probe = h.only_pending_probe();
    h.events();

    h.controller.disconnect();
    assert!(h.controller.host().cancelled_probes().contains(&probe));
    let interval = SessionControlConfig::testing().latency.interval();
    assert!(h.controller.host().timer_with_delay(interval).is_none());
    assert_eq!(published(&h.events()), vec![LatencyReading::Unavailable]);

    // A result that was already queued for the abandoned probe is ignored
    h.controller
        .handle(ControllerInput::ProbeCompleted { probe_id: probe, outcome: Ok(ms(30)) });
    assert!(published(&h.events()).is_empty());
    assert_eq!(h.controller.latency(), LatencyReading::Unavailable);
}

#[test]
fn test_transport_probe_fallback() {
    let mut h = Harness::build(
        SessionControlConfig::testing(),
        EmbeddingConfig {
            defaults: [(names::AUTOCONNECT.to_string(), SettingValue::Bool(false))]
                .into_iter()
                .collect(),
            ..EmbeddingConfig::default()
        },
        MemoryBackend::new(),
        ScriptedSessionFactory::new()
            .with_probes(ProbeSupport::PingWithTransportFallback)
            .with_transport_rtt(ms(120)),
    );
    h.controller.start().unwrap();
    h.controller.connect().unwrap();
    // No scripted pings, so the session ping fails and the transport answers
    h.emit(SessionEvent::Connected);
    let probe = h.only_pending_probe();
    h.complete_probe(probe);

    assert_eq!(h.controller.latency(), LatencyReading::Millis(120));
    assert_eq!(h.controller.quality(), ConnectionQuality::Fair);
}

#[test]
fn test_transport_probe_only() {
    let mut h = harness(ProbeSupport::Transport);
    h.emit(SessionEvent::Connected);
    let probe = h.only_pending_probe();
    h.complete_probe(probe);
    assert_eq!(h.controller.latency(), LatencyReading::Millis(80));
}

#[test]
fn test_window_resets_between_sessions() {
    let mut h = harness(ProbeSupport::Ping);
    h.log.script_pings([Ok(ms(300)), Ok(ms(20))]);
    h.emit(SessionEvent::Connected);
    let probe = h.only_pending_probe();
    h.complete_probe(probe);
    assert_eq!(h.controller.latency(), LatencyReading::Millis(300));

    h.controller.disconnect();
    h.emit(SessionEvent::Disconnected {
        clean: true,
        reason: None,
    });
    h.controller.connect().unwrap();
    h.emit(SessionEvent::Connected);
    let probe = h.only_pending_probe();
    h.complete_probe(probe);
    assert_eq!(h.controller.latency(), LatencyReading::Millis(20));
}

// ----------------------------------------------------------------------------
// Monitor without a controller
// ----------------------------------------------------------------------------

#[test]
fn test_monitor_ignores_foreign_timers() {
    use deskview_core::testing::MockHost;

    let mut host = MockHost::new();
    let mut monitor = LatencyMonitor::new(LatencyConfig::default());
    assert!(!monitor.owns_timer(TimerId(99)));
    assert_eq!(monitor.on_timer(TimerId(99), &mut host, None), None);
    assert_eq!(monitor.stop(&mut host), None);
    assert!(!monitor.is_running());
}
