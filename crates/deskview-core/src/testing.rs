//! Test doubles shared by the workspace's tests
//!
//! [`MockHost`] records timers and probes without running anything until a
//! test asks it to. [`ScriptedSessionFactory`] hands out sessions that log
//! every call into a shared [`SessionLog`] and answer pings from a script.
//! [`Harness`] wires both to a controller.

use core::time::Duration;
use futures::executor::block_on;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use url::Url;
use crate::SettingsBackend;

use crate::config::SessionControlConfig;
use crate::controller::ConnectionController;
use crate::errors::{ProbeError, SessionError};
use crate::events::AppEvent;
use crate::host::{input_channel, ControllerInput, Host, InputReceiver, ProbeId, TimerId};
use crate::session::{
    Credentials, ProbeFuture, Session, SessionEvent, SessionEventSink, SessionFactory, SessionId,
    SessionOptions,
};
use crate::settings::{EmbeddingConfig, MemoryBackend, SettingsStore};

// ----------------------------------------------------------------------------
// Mock Host
// ----------------------------------------------------------------------------

/// Host that only records what was asked of it
#[derive(Default)]
pub struct MockHost {
    next_id: u64,
    timers: BTreeMap<TimerId, Duration>,
    cleared: Vec<TimerId>,
    probes: BTreeMap<ProbeId, ProbeFuture>,
    cancelled: Vec<ProbeId>,
    tasks: Vec<LocalBoxFuture<'static, ()>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Timers still armed, in arming order
    pub fn armed_timers(&self) -> Vec<(TimerId, Duration)> {
        self.timers.iter().map(|(id, delay)| (*id, *delay)).collect()
    }

    /// Most recently armed timer with the given delay
    pub fn timer_with_delay(&self, delay: Duration) -> Option<TimerId> {
        self.timers
            .iter()
            .rev()
            .find(|(_, d)| **d == delay)
            .map(|(id, _)| *id)
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn cleared_timers(&self) -> &[TimerId] {
        &self.cleared
    }

    /// Disarm a timer and produce the input its expiry would deliver
    pub fn fire(&mut self, id: TimerId) -> ControllerInput {
        self.timers.remove(&id);
        ControllerInput::TimerFired(id)
    }

    /// Probes spawned and not yet completed or cancelled
    pub fn pending_probes(&self) -> Vec<ProbeId> {
        self.probes.keys().copied().collect()
    }

    pub fn cancelled_probes(&self) -> &[ProbeId] {
        &self.cancelled
    }

    /// Run a probe to completion and produce its completion input
    pub fn complete_probe(&mut self, id: ProbeId) -> Option<ControllerInput> {
        let probe = self.probes.remove(&id)?;
        let outcome = block_on(probe);
        Some(ControllerInput::ProbeCompleted {
            probe_id: id,
            outcome,
        })
    }

    /// Discard a probe and report the given outcome instead
    pub fn resolve_probe(
        &mut self,
        id: ProbeId,
        outcome: Result<Duration, ProbeError>,
    ) -> ControllerInput {
        self.probes.remove(&id);
        ControllerInput::ProbeCompleted {
            probe_id: id,
            outcome,
        }
    }

    /// Run every spawned background task; returns how many ran
    pub fn run_tasks(&mut self) -> usize {
        let tasks: Vec<_> = self.tasks.drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            block_on(task);
        }
        count
    }
}

impl Host for MockHost {
    fn set_timer(&mut self, delay: Duration) -> TimerId {
        let id = TimerId(self.allocate());
        self.timers.insert(id, delay);
        id
    }

    fn clear_timer(&mut self, id: TimerId) {
        if self.timers.remove(&id).is_some() {
            self.cleared.push(id);
        }
    }

    fn spawn_probe(&mut self, probe: ProbeFuture) -> ProbeId {
        let id = ProbeId(self.allocate());
        self.probes.insert(id, probe);
        id
    }

    fn cancel_probe(&mut self, id: ProbeId) {
        if self.probes.remove(&id).is_some() {
            self.cancelled.push(id);
        }
    }

    fn spawn_task(&mut self, task: LocalBoxFuture<'static, ()>) {
        self.tasks.push(task);
    }
}

impl core::fmt::Debug for MockHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockHost")
            .field("timers", &self.timers)
            .field("probes", &self.probes.keys().collect::<Vec<_>>())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Scripted Sessions
// ----------------------------------------------------------------------------

/// Operation performed on a recorded session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Disconnect(SessionId),
    ApproveServerIdentity(SessionId),
    SendCredentials(SessionId, Credentials),
    Focus(SessionId),
}

/// A session created by the scripted factory
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_id: SessionId,
    pub target: Url,
    pub options: SessionOptions,
}

#[derive(Default)]
struct LogInner {
    created: Vec<CreatedSession>,
    calls: Vec<SessionCall>,
    sinks: BTreeMap<SessionId, SessionEventSink>,
    pings: VecDeque<Result<Duration, ProbeError>>,
}

/// Shared record of everything the scripted sessions saw
#[derive(Clone, Default)]
pub struct SessionLog {
    inner: Rc<RefCell<LogInner>>,
}

impl SessionLog {
    pub fn created(&self) -> Vec<CreatedSession> {
        self.inner.borrow().created.clone()
    }

    pub fn created_count(&self) -> usize {
        self.inner.borrow().created.len()
    }

    pub fn last_created(&self) -> Option<CreatedSession> {
        self.inner.borrow().created.last().cloned()
    }

    pub fn latest_session_id(&self) -> Option<SessionId> {
        self.inner.borrow().created.last().map(|s| s.session_id)
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.borrow().calls.clone()
    }

    /// Raise an event as the given session would
    pub fn emit(&self, session_id: SessionId, event: SessionEvent) -> bool {
        let sink = self.inner.borrow().sinks.get(&session_id).cloned();
        sink.map_or(false, |sink| sink.emit(event))
    }

    /// Queue round-trip outcomes answered by subsequent pings
    pub fn script_pings<I: IntoIterator<Item = Result<Duration, ProbeError>>>(&self, outcomes: I) {
        self.inner.borrow_mut().pings.extend(outcomes);
    }

    fn record(&self, call: SessionCall) {
        self.inner.borrow_mut().calls.push(call);
    }

    fn next_ping(&self) -> Result<Duration, ProbeError> {
        self.inner
            .borrow_mut()
            .pings
            .pop_front()
            .unwrap_or(Err(ProbeError::Failed {
                reason: "no scripted round trip".to_string(),
            }))
    }
}

/// Probing capability of scripted sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSupport {
    None,
    Ping,
    Transport,
    PingWithTransportFallback,
}

/// Session factory for tests
pub struct ScriptedSessionFactory {
    log: SessionLog,
    fail_with: Option<String>,
    probes: ProbeSupport,
    transport_rtt: Duration,
}

impl Default for ScriptedSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSessionFactory {
    pub fn new() -> Self {
        Self {
            log: SessionLog::default(),
            fail_with: None,
            probes: ProbeSupport::Ping,
            transport_rtt: Duration::from_millis(80),
        }
    }

    /// Every `create` fails with the given reason
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::new()
        }
    }

    pub fn with_probes(mut self, probes: ProbeSupport) -> Self {
        self.probes = probes;
        self
    }

    pub fn with_transport_rtt(mut self, rtt: Duration) -> Self {
        self.transport_rtt = rtt;
        self
    }

    pub fn log(&self) -> SessionLog {
        self.log.clone()
    }
}

impl SessionFactory for ScriptedSessionFactory {
    fn create(
        &mut self,
        target: &Url,
        options: SessionOptions,
        sink: SessionEventSink,
    ) -> Result<Box<dyn Session>, SessionError> {
        if let Some(reason) = &self.fail_with {
            return Err(SessionError::Construction {
                reason: reason.clone(),
            });
        }
        let id = sink.session_id();
        {
            let mut inner = self.log.inner.borrow_mut();
            inner.created.push(CreatedSession {
                session_id: id,
                target: target.clone(),
                options,
            });
            inner.sinks.insert(id, sink);
        }
        Ok(Box::new(RecordingSession {
            id,
            log: self.log.clone(),
            probes: self.probes,
            transport_rtt: self.transport_rtt,
        }))
    }
}

/// Session that records calls and answers pings from the log's script
pub struct RecordingSession {
    id: SessionId,
    log: SessionLog,
    probes: ProbeSupport,
    transport_rtt: Duration,
}

impl Session for RecordingSession {
    fn disconnect(&mut self) {
        self.log.record(SessionCall::Disconnect(self.id));
    }

    fn approve_server_identity(&mut self) {
        self.log.record(SessionCall::ApproveServerIdentity(self.id));
    }

    fn send_credentials(&mut self, credentials: Credentials) {
        self.log.record(SessionCall::SendCredentials(self.id, credentials));
    }

    fn focus(&mut self) {
        self.log.record(SessionCall::Focus(self.id));
    }

    fn ping(&self) -> Option<ProbeFuture> {
        match self.probes {
            ProbeSupport::Ping | ProbeSupport::PingWithTransportFallback => {
                let outcome = self.log.next_ping();
                Some(Box::pin(async move { outcome }))
            }
            _ => None,
        }
    }

    fn transport_probe(&self) -> Option<ProbeFuture> {
        match self.probes {
            ProbeSupport::Transport | ProbeSupport::PingWithTransportFallback => {
                let rtt = self.transport_rtt;
                Some(Box::pin(async move { Ok(rtt) }))
            }
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Controller Harness
// ----------------------------------------------------------------------------

/// A controller wired to a mock host, scripted sessions and memory storage
pub struct Harness {
    pub controller: ConnectionController<MockHost>,
    pub inputs: InputReceiver,
    pub log: SessionLog,
    pub backend: Rc<MemoryBackend>,
}

impl Harness {
    /// Harness with test timings and a same-origin page at
    /// `https://viewer.example/vnc.html`
    pub fn new(embedding: EmbeddingConfig) -> Self {
        Self::build(
            SessionControlConfig::testing(),
            embedding,
            MemoryBackend::new(),
            ScriptedSessionFactory::new(),
        )
    }

    pub fn build(
        config: SessionControlConfig,
        mut embedding: EmbeddingConfig,
        backend: MemoryBackend,
        factory: ScriptedSessionFactory,
    ) -> Self {
        if embedding.page_url.is_none() {
            embedding.page_url = Some("https://viewer.example/vnc.html".to_string());
        }
        let backend = Rc::new(backend);
        let mut settings = SettingsStore::new(Rc::clone(&backend) as Rc<dyn SettingsBackend>, embedding)
            .expect("valid embedding configuration");
        block_on(settings.initialize());

        let log = factory.log();
        let (tx, inputs) = input_channel();
        let controller =
            ConnectionController::new(config, settings, Box::new(factory), MockHost::new(), tx);
        Self {
            controller,
            inputs,
            log,
            backend,
        }
    }

    /// Handle everything queued so far
    pub fn pump(&mut self) -> usize {
        self.controller.process_pending(&mut self.inputs)
    }

    /// Raise an event from the most recently created session and handle it
    pub fn emit(&mut self, event: SessionEvent) {
        let id = self.log.latest_session_id().expect("a session was created");
        self.emit_from(id, event);
    }

    pub fn emit_from(&mut self, session_id: SessionId, event: SessionEvent) {
        self.log.emit(session_id, event);
        self.pump();
    }

    /// Expire a timer through the host and handle it
    pub fn fire(&mut self, id: TimerId) {
        let input = self.controller.host_mut().fire(id);
        self.controller.handle(input);
        self.pump();
    }

    /// Complete a probe with its own outcome and handle the result
    pub fn complete_probe(&mut self, id: ProbeId) {
        if let Some(input) = self.controller.host_mut().complete_probe(id) {
            self.controller.handle(input);
        }
        self.pump();
    }

    pub fn only_pending_probe(&self) -> ProbeId {
        let probes = self.controller.host().pending_probes();
        assert_eq!(probes.len(), 1, "expected exactly one pending probe");
        probes[0]
    }

    pub fn events(&mut self) -> Vec<AppEvent> {
        self.controller.drain_events()
    }
}
