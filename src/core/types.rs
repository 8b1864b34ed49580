//! Core data types flowing through the command pipeline.
//!
//! - [`RawFrame`]: one fixed-size unit read off the stream
//! - [`Command`]: decoded `(steering, throttle)` pair, nominally in [-1, 1]
//! - [`ActuatorSignal`]: mapped values ready for the actuator sinks

use crate::error::{Error, Result};

/// Size of one command on the wire: two big-endian f64 values
pub const FRAME_LEN: usize = 16;

/// Exactly one frame of wire bytes
pub type RawFrame = [u8; FRAME_LEN];

/// Decoded drive command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    /// Steering input, -1.0 (full left) .. 1.0 (full right)
    pub steering: f64,
    /// Throttle input, -1.0 (full reverse) .. 1.0 (full forward)
    pub throttle: f64,
}

impl Command {
    /// Create a new command
    pub fn new(steering: f64, throttle: f64) -> Self {
        Self { steering, throttle }
    }

    /// Reject values that cannot be clamped into a meaningful output.
    ///
    /// Infinities clamp to the range ends; NaN has no ordering and is refused.
    pub fn validate(self) -> Result<Self> {
        if self.steering.is_nan() {
            return Err(Error::InvalidCommand("steering is NaN".to_string()));
        }
        if self.throttle.is_nan() {
            return Err(Error::InvalidCommand("throttle is NaN".to_string()));
        }
        Ok(self)
    }
}

/// Output values for the actuator sinks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorSignal {
    /// Steering servo angle in degrees
    pub steering_angle_deg: f64,
    /// Normalized drive value, -1.0 .. 1.0
    pub throttle: f64,
}

impl ActuatorSignal {
    /// Wheels centered, motor stopped
    pub const NEUTRAL: ActuatorSignal = ActuatorSignal {
        steering_angle_deg: 90.0,
        throttle: 0.0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_finite_and_infinite() {
        assert!(Command::new(0.5, -0.3).validate().is_ok());
        assert!(Command::new(f64::INFINITY, f64::NEG_INFINITY).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let err = Command::new(f64::NAN, 0.0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
        let err = Command::new(0.0, f64::NAN).validate().unwrap_err();
        assert!(err.to_string().contains("throttle"));
    }
}
