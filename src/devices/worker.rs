//! Dedicated actuator thread fed by a single-slot mailbox
//!
//! When the bus is slower than the command stream, queuing would replay
//! stale commands. The [`SignalSlot`] holds at most one pending signal: a new
//! `put` replaces whatever the worker has not picked up yet.

use crate::core::actuator::ActuatorSink;
use crate::core::types::ActuatorSignal;
use crate::error::{Error, Result};
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Default)]
struct SlotState {
    value: Option<ActuatorSignal>,
    closed: bool,
    /// Signals replaced before the worker took them
    overwritten: u64,
}

/// Latest-value-wins handoff cell
#[derive(Debug, Clone, Default)]
pub struct SignalSlot {
    inner: Arc<(Mutex<SlotState>, Condvar)>,
}

impl SignalSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `signal`, replacing any value not yet taken.
    ///
    /// Returns `true` if an untaken value was overwritten.
    pub fn put(&self, signal: ActuatorSignal) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        let replaced = state.value.replace(signal).is_some();
        if replaced {
            state.overwritten += 1;
        }
        cvar.notify_one();
        replaced
    }

    /// Take the pending value without waiting
    pub fn try_take(&self) -> Option<ActuatorSignal> {
        self.inner.0.lock().value.take()
    }

    /// Wait for a value. Returns `None` once the slot is closed and empty.
    pub fn take(&self) -> Option<ActuatorSignal> {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        loop {
            if let Some(signal) = state.value.take() {
                return Some(signal);
            }
            if state.closed {
                return None;
            }
            cvar.wait(&mut state);
        }
    }

    /// Stop the consumer after it drains the pending value
    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().closed = true;
        cvar.notify_all();
    }

    /// Number of signals dropped because a newer one replaced them
    pub fn overwritten(&self) -> u64 {
        self.inner.0.lock().overwritten
    }
}

/// Actuator sink that forwards to another sink running on its own thread
pub struct ActuatorWorker {
    slot: SignalSlot,
    handle: Option<JoinHandle<()>>,
    name: &'static str,
    /// Last signal handed over, so single-axis calls keep the other axis
    last: ActuatorSignal,
}

impl ActuatorWorker {
    /// Move `sink` onto a new `actuator` thread
    pub fn spawn<S: ActuatorSink + 'static>(mut sink: S) -> Result<Self> {
        let slot = SignalSlot::new();
        let worker_slot = slot.clone();
        let name = sink.name();

        let handle = thread::Builder::new()
            .name("actuator".to_string())
            .spawn(move || {
                info!("Actuator thread started ({})", sink.name());
                while let Some(signal) = worker_slot.take() {
                    sink.apply(signal);
                }
                debug!("Actuator thread exiting");
            })
            .map_err(|e| Error::HardwareInit(format!("Failed to spawn actuator thread: {}", e)))?;

        Ok(Self {
            slot,
            handle: Some(handle),
            name,
            last: ActuatorSignal::NEUTRAL,
        })
    }

    /// Handle to the slot, for inspection
    pub fn slot(&self) -> &SignalSlot {
        &self.slot
    }

    fn hand_over(&mut self, signal: ActuatorSignal) {
        self.last = signal;
        if self.slot.put(signal) {
            debug!("Actuator busy; superseded pending signal");
        }
    }
}

impl ActuatorSink for ActuatorWorker {
    fn set_steering(&mut self, angle_degrees: f64) {
        let signal = ActuatorSignal {
            steering_angle_deg: angle_degrees,
            ..self.last
        };
        self.hand_over(signal);
    }

    fn set_throttle(&mut self, value: f64) {
        let signal = ActuatorSignal {
            throttle: value,
            ..self.last
        };
        self.hand_over(signal);
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&mut self, signal: ActuatorSignal) {
        self.hand_over(signal);
    }
}

impl Drop for ActuatorWorker {
    fn drop(&mut self) {
        self.slot.close();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Actuator thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockActuator;
    use std::time::Duration;

    fn signal(angle: f64) -> ActuatorSignal {
        ActuatorSignal {
            steering_angle_deg: angle,
            throttle: 0.0,
        }
    }

    #[test]
    fn test_slot_keeps_only_latest() {
        let slot = SignalSlot::new();
        assert!(!slot.put(signal(10.0)));
        assert!(slot.put(signal(20.0)));
        assert!(slot.put(signal(30.0)));
        assert_eq!(slot.try_take(), Some(signal(30.0)));
        assert_eq!(slot.try_take(), None);
        assert_eq!(slot.overwritten(), 2);
    }

    #[test]
    fn test_closed_slot_drains_then_ends() {
        let slot = SignalSlot::new();
        slot.put(signal(1.0));
        slot.close();
        assert_eq!(slot.take(), Some(signal(1.0)));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_worker_applies_latest_and_skips_stale() {
        let recorder = MockActuator::new().with_delay(Duration::from_millis(50));
        let mut worker = ActuatorWorker::spawn(recorder.clone()).unwrap();

        for angle in [10.0, 20.0, 30.0, 40.0, 50.0] {
            worker.apply(signal(angle));
        }
        drop(worker);

        let applied = recorder.applied();
        assert!(!applied.is_empty());
        assert!(applied.len() < 5);
        assert_eq!(applied.last().unwrap().steering_angle_deg, 50.0);
    }

    #[test]
    fn test_single_axis_calls_keep_other_axis() {
        let recorder = MockActuator::new();
        let mut worker = ActuatorWorker::spawn(recorder.clone()).unwrap();
        worker.set_throttle(0.4);
        drop(worker);

        assert_eq!(recorder.last(), (Some(90.0), Some(0.4)));
    }
}
