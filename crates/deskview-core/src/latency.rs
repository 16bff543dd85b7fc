//! Latency monitoring
//!
//! While a session is connected the monitor probes the peer on a fixed
//! interval and publishes the rounded mean of a bounded window of
//! successful round trips. Failed or timed-out probes publish
//! "unavailable" for that cycle and are never added to the window.

use core::fmt;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

use crate::config::LatencyConfig;
use crate::errors::ProbeError;
use crate::host::{Host, ProbeId, TimerId};
use crate::session::{ProbeFuture, Session};

// ----------------------------------------------------------------------------
// Readings
// ----------------------------------------------------------------------------

/// Published latency value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyReading {
    #[default]
    Unavailable,
    Millis(u32),
}

impl LatencyReading {
    pub fn millis(&self) -> Option<u32> {
        match self {
            LatencyReading::Millis(ms) => Some(*ms),
            LatencyReading::Unavailable => None,
        }
    }

    pub fn quality(&self) -> ConnectionQuality {
        match self {
            LatencyReading::Millis(ms) => ConnectionQuality::from_millis(*ms),
            LatencyReading::Unavailable => ConnectionQuality::Poor,
        }
    }
}

impl fmt::Display for LatencyReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyReading::Millis(ms) => write!(f, "{}ms", ms),
            LatencyReading::Unavailable => write!(f, "--"),
        }
    }
}

/// Connection quality bucket shown next to the latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    pub fn from_millis(ms: u32) -> Self {
        match ms {
            0..=49 => ConnectionQuality::Excellent,
            50..=99 => ConnectionQuality::Good,
            100..=199 => ConnectionQuality::Fair,
            _ => ConnectionQuality::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Fair => "fair",
            ConnectionQuality::Poor => "poor",
        }
    }
}

// ----------------------------------------------------------------------------
// Sample Window
// ----------------------------------------------------------------------------

/// Bounded window of successful samples, oldest evicted first
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<u32>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, millis: u32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(millis);
    }

    /// Arithmetic mean rounded to the nearest millisecond
    pub fn mean(&self) -> Option<u32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().map(|&ms| u64::from(ms)).sum();
        Some((sum as f64 / self.samples.len() as f64).round() as u32)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn samples(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples.iter().copied()
    }
}

// ----------------------------------------------------------------------------
// Monitor
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct PendingProbe {
    probe_id: ProbeId,
    timeout: TimerId,
}

/// Periodic round-trip measurement against the live session
///
/// Methods that may publish return `Some(reading)` when they did.
#[derive(Debug)]
pub struct LatencyMonitor {
    config: LatencyConfig,
    window: LatencyWindow,
    published: LatencyReading,
    running: bool,
    tick: Option<TimerId>,
    pending: Option<PendingProbe>,
}

impl LatencyMonitor {
    pub fn new(config: LatencyConfig) -> Self {
        Self {
            window: LatencyWindow::new(config.window_capacity),
            config,
            published: LatencyReading::Unavailable,
            running: false,
            tick: None,
            pending: None,
        }
    }

    /// Begin periodic probing and fire the first probe immediately
    pub fn start<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        session: &dyn Session,
    ) -> Option<LatencyReading> {
        if self.running {
            debug!("Latency monitor already running");
            return None;
        }
        self.running = true;
        self.tick = Some(host.set_timer(self.config.interval()));
        self.probe_cycle(host, Some(session))
    }

    /// Cancel timers and any in-flight probe, clear the window and publish
    /// "unavailable"
    pub fn stop<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<LatencyReading> {
        if let Some(tick) = self.tick.take() {
            host.clear_timer(tick);
        }
        if let Some(pending) = self.pending.take() {
            host.clear_timer(pending.timeout);
            host.cancel_probe(pending.probe_id);
        }
        let was_running = core::mem::replace(&mut self.running, false);
        self.window.clear();

        if was_running || self.published != LatencyReading::Unavailable {
            self.publish(LatencyReading::Unavailable)
        } else {
            None
        }
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.tick == Some(id) || self.pending.map(|p| p.timeout) == Some(id)
    }

    /// Handle one of the monitor's timers
    ///
    /// `session` is the live session if it is connected.
    pub fn on_timer<H: Host + ?Sized>(
        &mut self,
        id: TimerId,
        host: &mut H,
        session: Option<&dyn Session>,
    ) -> Option<LatencyReading> {
        if self.tick == Some(id) {
            self.tick = Some(host.set_timer(self.config.interval()));
            return self.probe_cycle(host, session);
        }

        match self.pending {
            Some(pending) if pending.timeout == id => {
                self.pending = None;
                host.cancel_probe(pending.probe_id);
                debug!(probe = %pending.probe_id, "Latency probe timed out");
                self.publish(LatencyReading::Unavailable)
            }
            _ => {
                debug!(timer = %id, "Ignoring stale latency timer");
                None
            }
        }
    }

    /// Handle a finished probe; results for abandoned probes are ignored
    pub fn on_probe_completed<H: Host + ?Sized>(
        &mut self,
        probe_id: ProbeId,
        outcome: Result<core::time::Duration, ProbeError>,
        host: &mut H,
    ) -> Option<LatencyReading> {
        let pending = match self.pending {
            Some(pending) if pending.probe_id == probe_id => pending,
            _ => {
                debug!(probe = %probe_id, "Ignoring stale latency probe result");
                return None;
            }
        };
        self.pending = None;
        host.clear_timer(pending.timeout);

        match outcome {
            Ok(rtt) => {
                let millis = u32::try_from(rtt.as_millis()).unwrap_or(u32::MAX);
                self.window.push(millis);
                let mean = self
                    .window
                    .mean()
                    .map_or(LatencyReading::Unavailable, LatencyReading::Millis);
                self.publish(mean)
            }
            Err(e) => {
                debug!(probe = %probe_id, "Latency probe failed: {}", e);
                self.publish(LatencyReading::Unavailable)
            }
        }
    }

    fn probe_cycle<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        session: Option<&dyn Session>,
    ) -> Option<LatencyReading> {
        let Some(session) = session else {
            return self.publish(LatencyReading::Unavailable);
        };
        if self.pending.is_some() {
            debug!("Latency probe still in flight, skipping cycle");
            return None;
        }
        let Some(probe) = build_probe(session) else {
            return self.publish(LatencyReading::Unavailable);
        };

        let probe_id = host.spawn_probe(probe);
        let timeout = host.set_timer(self.config.probe_timeout());
        self.pending = Some(PendingProbe { probe_id, timeout });
        None
    }

    fn publish(&mut self, reading: LatencyReading) -> Option<LatencyReading> {
        self.published = reading;
        Some(reading)
    }

    pub fn published(&self) -> LatencyReading {
        self.published
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_pending_probe(&self) -> bool {
        self.pending.is_some()
    }

    pub fn window(&self) -> &LatencyWindow {
        &self.window
    }
}

/// Session ping first, falling back to the transport probe if the ping is
/// missing or fails
fn build_probe(session: &dyn Session) -> Option<ProbeFuture> {
    match (session.ping(), session.transport_probe()) {
        (None, None) => None,
        (Some(ping), None) => Some(ping),
        (None, Some(transport)) => Some(transport),
        (Some(ping), Some(transport)) => Some(Box::pin(async move {
            match ping.await {
                Ok(rtt) => Ok(rtt),
                Err(e) => {
                    debug!("Session ping failed, using transport probe: {}", e);
                    transport.await
                }
            }
        })),
    }
}
