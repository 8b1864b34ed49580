//! ActuatorSink trait definition

use crate::core::types::ActuatorSignal;

/// Consumer of mapped control values.
///
/// Calls are synchronous and infallible at this interface: drivers log their
/// own bus errors instead of returning them, so one failed write never stalls
/// the command loop.
pub trait ActuatorSink: Send {
    /// Move the steering servo to an absolute angle in degrees
    fn set_steering(&mut self, angle_degrees: f64);

    /// Set the drive output, -1.0 (full reverse) .. 1.0 (full forward)
    fn set_throttle(&mut self, value: f64);

    /// Short driver name for logs
    fn name(&self) -> &'static str;

    /// Apply both halves of a signal, steering first
    fn apply(&mut self, signal: ActuatorSignal) {
        self.set_steering(signal.steering_angle_deg);
        self.set_throttle(signal.throttle);
    }
}

impl<S: ActuatorSink + ?Sized> ActuatorSink for Box<S> {
    fn set_steering(&mut self, angle_degrees: f64) {
        (**self).set_steering(angle_degrees)
    }

    fn set_throttle(&mut self, value: f64) {
        (**self).set_throttle(value)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn apply(&mut self, signal: ActuatorSignal) {
        (**self).apply(signal)
    }
}
