//! Host seam for timers, probes and the controller input queue
//!
//! The controller never sleeps or spawns on its own. It asks the [`Host`] for a
//! timer or a background probe and later receives the outcome as a
//! [`ControllerInput`] on a single ordered queue, together with session events.
//! Every input carries the id it was issued under, so completions that belong
//! to a cancelled timer, an abandoned probe or a torn-down session can be
//! recognised and dropped.

use core::fmt;
use core::time::Duration;
use futures::channel::mpsc;
use futures::future::LocalBoxFuture;

use crate::errors::ProbeError;
use crate::session::{ProbeFuture, SessionEvent, SessionId};

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

/// Handle for a one-shot timer armed through the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Handle for a background probe spawned through the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probe#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Controller Input
// ----------------------------------------------------------------------------

/// Everything that can drive the controller besides direct user operations
#[derive(Debug)]
pub enum ControllerInput {
    /// Event raised by the session with the given id
    Session {
        session_id: SessionId,
        event: SessionEvent,
    },
    /// A timer armed through [`Host::set_timer`] elapsed
    TimerFired(TimerId),
    /// A probe spawned through [`Host::spawn_probe`] finished
    ProbeCompleted {
        probe_id: ProbeId,
        outcome: Result<Duration, ProbeError>,
    },
}

pub type InputSender = mpsc::UnboundedSender<ControllerInput>;
pub type InputReceiver = mpsc::UnboundedReceiver<ControllerInput>;

/// Create the controller input queue
pub fn input_channel() -> (InputSender, InputReceiver) {
    mpsc::unbounded()
}

// ----------------------------------------------------------------------------
// Host Trait
// ----------------------------------------------------------------------------

/// Scheduling services supplied by the embedding runtime
///
/// Implementations deliver [`ControllerInput::TimerFired`] and
/// [`ControllerInput::ProbeCompleted`] on the controller's input queue. A
/// cleared timer or cancelled probe must not deliver anything afterwards, but
/// the controller tolerates it if a completion was already queued.
pub trait Host {
    /// Arm a one-shot timer
    fn set_timer(&mut self, delay: Duration) -> TimerId;

    /// Disarm a timer; unknown or already fired ids are ignored
    fn clear_timer(&mut self, id: TimerId);

    /// Run a probe future in the background
    fn spawn_probe(&mut self, probe: ProbeFuture) -> ProbeId;

    /// Abandon a running probe; unknown or finished ids are ignored
    fn cancel_probe(&mut self, id: ProbeId);

    /// Run a fire-and-forget task such as a settings write
    fn spawn_task(&mut self, task: LocalBoxFuture<'static, ()>);
}

impl<H: Host + ?Sized> Host for Box<H> {
    fn set_timer(&mut self, delay: Duration) -> TimerId {
        (**self).set_timer(delay)
    }

    fn clear_timer(&mut self, id: TimerId) {
        (**self).clear_timer(id)
    }

    fn spawn_probe(&mut self, probe: ProbeFuture) -> ProbeId {
        (**self).spawn_probe(probe)
    }

    fn cancel_probe(&mut self, id: ProbeId) {
        (**self).cancel_probe(id)
    }

    fn spawn_task(&mut self, task: LocalBoxFuture<'static, ()>) {
        (**self).spawn_task(task)
    }
}
