//! Tokio implementation of the controller's scheduling host
//!
//! Timers and probes run as local tasks that report back on the controller
//! input queue. Clearing a timer or cancelling a probe aborts its task.

use deskview_core::{ControllerInput, Host, InputSender, ProbeFuture, ProbeId, TimerId};
use futures::future::LocalBoxFuture;
use instant::Instant;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// [`Host`] backed by `tokio::task::spawn_local`
///
/// Must be used from inside a `LocalSet`.
pub struct TokioHost {
    inputs: InputSender,
    next_id: u64,
    timers: HashMap<TimerId, JoinHandle<()>>,
    probes: HashMap<ProbeId, JoinHandle<()>>,
}

impl TokioHost {
    pub fn new(inputs: InputSender) -> Self {
        Self {
            inputs,
            next_id: 1,
            timers: HashMap::new(),
            probes: HashMap::new(),
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn prune(&mut self) {
        self.timers.retain(|_, handle| !handle.is_finished());
        self.probes.retain(|_, handle| !handle.is_finished());
    }

    /// Timers armed and not yet fired or cleared
    pub fn active_timers(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }

    /// Probes still running
    pub fn active_probes(&self) -> usize {
        self.probes.values().filter(|h| !h.is_finished()).count()
    }
}

impl Host for TokioHost {
    fn set_timer(&mut self, delay: Duration) -> TimerId {
        self.prune();
        let id = TimerId(self.allocate());
        let inputs = self.inputs.clone();
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if inputs.unbounded_send(ControllerInput::TimerFired(id)).is_err() {
                trace!(%id, "Controller gone before timer fired");
            }
        });
        self.timers.insert(id, handle);
        id
    }

    fn clear_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }

    fn spawn_probe(&mut self, probe: ProbeFuture) -> ProbeId {
        self.prune();
        let id = ProbeId(self.allocate());
        let inputs = self.inputs.clone();
        let handle = tokio::task::spawn_local(async move {
            let started = Instant::now();
            let outcome = probe.await;
            debug!(%id, elapsed = ?started.elapsed(), ok = outcome.is_ok(), "Probe finished");
            let _ = inputs.unbounded_send(ControllerInput::ProbeCompleted {
                probe_id: id,
                outcome,
            });
        });
        self.probes.insert(id, handle);
        id
    }

    fn cancel_probe(&mut self, id: ProbeId) {
        if let Some(handle) = self.probes.remove(&id) {
            handle.abort();
        }
    }

    fn spawn_task(&mut self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }
}

impl Drop for TokioHost {
    fn drop(&mut self) {
        for handle in self.timers.drain().map(|(_, h)| h).chain(self.probes.drain().map(|(_, h)| h)) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TokioHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioHost")
            .field("timers", &self.timers.len())
            .field("probes", &self.probes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskview_core::input_channel;
    use futures::StreamExt;
    use tokio::task::LocalSet;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_timer_fires_after_delay() {
        LocalSet::new()
            .run_until(async {
                let (tx, mut rx) = input_channel();
                let mut host = TokioHost::new(tx);
                let id = host.set_timer(Duration::from_millis(250));

                match rx.next().await {
                    Some(ControllerInput::TimerFired(fired)) => assert_eq!(fired, id),
                    other => panic!("unexpected input: {:?}", other),
                }
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_cleared_timer_never_fires() {
        LocalSet::new()
            .run_until(async {
                let (tx, mut rx) = input_channel();
                let mut host = TokioHost::new(tx);
                let cleared = host.set_timer(Duration::from_millis(100));
                let kept = host.set_timer(Duration::from_millis(200));
                host.clear_timer(cleared);

                tokio::time::sleep(Duration::from_millis(500)).await;
                match rx.next().await {
                    Some(ControllerInput::TimerFired(fired)) => assert_eq!(fired, kept),
                    other => panic!("unexpected input: {:?}", other),
                }
                assert!(rx.try_recv().is_err());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_cancelled_probe_reports_nothing() {
        LocalSet::new()
            .run_until(async {
                let (tx, mut rx) = input_channel();
                let mut host = TokioHost::new(tx);
                let slow: ProbeFuture = Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(Duration::from_millis(1))
                });
                let fast: ProbeFuture = Box::pin(async { Ok(Duration::from_millis(42)) });
                let cancelled = host.spawn_probe(slow);
                let finished = host.spawn_probe(fast);
                host.cancel_probe(cancelled);

                tokio::time::sleep(Duration::from_secs(20)).await;
                match rx.next().await {
                    Some(ControllerInput::ProbeCompleted { probe_id, outcome }) => {
                        assert_eq!(probe_id, finished);
                        assert_eq!(outcome, Ok(Duration::from_millis(42)));
                    }
                    other => panic!("unexpected input: {:?}", other),
                }
                assert!(rx.try_recv().is_err());
                assert_eq!(host.active_probes(), 0);
            })
            .await;
    }
}
