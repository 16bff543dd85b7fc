//! Browser implementation of the controller's scheduling host

use deskview_core::{ControllerInput, Host, InputSender, ProbeFuture, ProbeId, TimerId};
use futures::future::{abortable, AbortHandle, LocalBoxFuture};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{error, trace};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::utils::{js_error_text, window};

struct PendingTimer {
    handle: Option<i32>,
    fired: Rc<Cell<bool>>,
    _callback: Closure<dyn FnMut()>,
}

struct PendingProbe {
    abort: AbortHandle,
    done: Rc<Cell<bool>>,
}

/// [`Host`] backed by `window.setTimeout` and `spawn_local`
pub struct WebHost {
    window: web_sys::Window,
    inputs: InputSender,
    next_id: u64,
    timers: HashMap<TimerId, PendingTimer>,
    probes: HashMap<ProbeId, PendingProbe>,
}

impl WebHost {
    pub fn new(inputs: InputSender) -> Result<Self, JsValue> {
        Ok(Self {
            window: window()?,
            inputs,
            next_id: 1,
            timers: HashMap::new(),
            probes: HashMap::new(),
        })
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn prune(&mut self) {
        self.timers.retain(|_, timer| !timer.fired.get());
        self.probes.retain(|_, probe| !probe.done.get());
    }
}

impl Host for WebHost {
    fn set_timer(&mut self, delay: Duration) -> TimerId {
        self.prune();
        let id = TimerId(self.allocate());
        let fired = Rc::new(Cell::new(false));
        let inputs = self.inputs.clone();
        let flag = Rc::clone(&fired);
        let callback: Closure<dyn FnMut()> = Closure::once(move || {
            flag.set(true);
            if inputs.unbounded_send(ControllerInput::TimerFired(id)).is_err() {
                trace!(%id, "Controller gone before timer fired");
            }
        });

        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        let handle = match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                millis,
            ) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(%id, error = %js_error_text(&e), "setTimeout failed");
                None
            }
        };
        self.timers.insert(
            id,
            PendingTimer {
                handle,
                fired,
                _callback: callback,
            },
        );
        id
    }

    fn clear_timer(&mut self, id: TimerId) {
        if let Some(PendingTimer {
            handle: Some(handle),
            ..
        }) = self.timers.remove(&id)
        {
            self.window.clear_timeout_with_handle(handle);
        }
    }

    fn spawn_probe(&mut self, probe: ProbeFuture) -> ProbeId {
        self.prune();
        let id = ProbeId(self.allocate());
        let (probe, abort) = abortable(probe);
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        let inputs = self.inputs.clone();
        spawn_local(async move {
            let outcome = probe.await;
            flag.set(true);
            if let Ok(outcome) = outcome {
                let _ = inputs.unbounded_send(ControllerInput::ProbeCompleted {
                    probe_id: id,
                    outcome,
                });
            }
        });
        self.probes.insert(id, PendingProbe { abort, done });
        id
    }

    fn cancel_probe(&mut self, id: ProbeId) {
        if let Some(probe) = self.probes.remove(&id) {
            probe.abort.abort();
        }
    }

    fn spawn_task(&mut self, task: LocalBoxFuture<'static, ()>) {
        spawn_local(task);
    }
}

impl Drop for WebHost {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            if let Some(handle) = timer.handle {
                self.window.clear_timeout_with_handle(handle);
            }
        }
        for (_, probe) in self.probes.drain() {
            probe.abort.abort();
        }
    }
}
