//! Mock actuator that records every call
//!
//! Used for dry runs (`driver = "mock"`) and by the test suite. Clones share
//! the same record, so a test can keep one handle and give the other to the
//! command loop.

use crate::core::actuator::ActuatorSink;
use crate::core::types::ActuatorSignal;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One recorded sink call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCall {
    Steering(f64),
    Throttle(f64),
}

/// Recording actuator sink
#[derive(Debug, Clone, Default)]
pub struct MockActuator {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
    /// Artificial latency per call, to model a slow bus
    delay: Option<Duration>,
}

impl MockActuator {
    /// Create a mock with no latency
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().clone()
    }

    /// Signals applied so far, pairing each steering call with the next throttle call
    pub fn applied(&self) -> Vec<ActuatorSignal> {
        let calls = self.calls.lock();
        let mut signals = Vec::new();
        let mut steering = None;
        for call in calls.iter() {
            match *call {
                ActuatorCall::Steering(angle) => steering = Some(angle),
                ActuatorCall::Throttle(value) => {
                    if let Some(angle) = steering.take() {
                        signals.push(ActuatorSignal {
                            steering_angle_deg: angle,
                            throttle: value,
                        });
                    }
                }
            }
        }
        signals
    }

    /// Most recent steering angle and throttle value
    pub fn last(&self) -> (Option<f64>, Option<f64>) {
        let calls = self.calls.lock();
        let steering = calls.iter().rev().find_map(|c| match c {
            ActuatorCall::Steering(a) => Some(*a),
            _ => None,
        });
        let throttle = calls.iter().rev().find_map(|c| match c {
            ActuatorCall::Throttle(v) => Some(*v),
            _ => None,
        });
        (steering, throttle)
    }

    fn record(&self, call: ActuatorCall) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        debug!("Mock actuator: {:?}", call);
        self.calls.lock().push(call);
    }
}

impl ActuatorSink for MockActuator {
    fn set_steering(&mut self, angle_degrees: f64) {
        self.record(ActuatorCall::Steering(angle_degrees));
    }

    fn set_throttle(&mut self, value: f64) {
        self.record(ActuatorCall::Throttle(value));
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
