//! Range mapping from commands to actuator signals
//!
//! Throttle is a straight clamp into [-1, 1]. Steering goes through a pinned
//! [`SteeringPolicy`]:
//!
//! | Policy      | Formula                              | Output range |
//! |-------------|--------------------------------------|--------------|
//! | `servo`     | `clamp((1 - s) * 90, 0, 180)`        | [0, 180]     |
//! | `alternate` | `-clamp(s, -1, 1) * 180 - 90`        | [-270, 90]   |
//!
//! `servo` keeps the output inside a standard servo's travel and is the
//! default. `alternate` reproduces an older calibration that leaves the
//! servo's range; configuration refuses it unless explicitly acknowledged.

use crate::core::types::{ActuatorSignal, Command};
use serde::{Deserialize, Serialize};

/// Lower and upper bound for normalized inputs
const INPUT_MIN: f64 = -1.0;
const INPUT_MAX: f64 = 1.0;

/// Servo travel in degrees
const SERVO_MIN_DEG: f64 = 0.0;
const SERVO_MAX_DEG: f64 = 180.0;

/// Steering mapping policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringPolicy {
    /// Inverted servo mapping centered at 90°: -1 → 180°, 0 → 90°, 1 → 0°
    #[default]
    Servo,
    /// Legacy mapping with output in [-270, 90]; not range-safe
    Alternate,
}

impl SteeringPolicy {
    /// Map a steering input to degrees.
    #[inline]
    pub fn steering_angle(self, steering: f64) -> f64 {
        match self {
            SteeringPolicy::Servo => {
                ((-steering + 1.0) * 90.0).clamp(SERVO_MIN_DEG, SERVO_MAX_DEG)
            }
            SteeringPolicy::Alternate => -steering.clamp(INPUT_MIN, INPUT_MAX) * 180.0 - 90.0,
        }
    }

    /// Whether every output of this policy stays inside servo travel
    pub fn is_range_safe(self) -> bool {
        matches!(self, SteeringPolicy::Servo)
    }
}

/// Stateless command-to-signal mapper
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeMapper {
    policy: SteeringPolicy,
}

impl RangeMapper {
    /// Create a mapper with a pinned steering policy
    pub fn new(policy: SteeringPolicy) -> Self {
        Self { policy }
    }

    /// Steering policy in use
    pub fn policy(&self) -> SteeringPolicy {
        self.policy
    }

    /// Clamp and map a command
    #[inline]
    pub fn map(&self, cmd: Command) -> ActuatorSignal {
        ActuatorSignal {
            steering_angle_deg: self.policy.steering_angle(cmd.steering),
            throttle: cmd.throttle.clamp(INPUT_MIN, INPUT_MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_servo_policy_fixed_points() {
        let mapper = RangeMapper::default();
        assert_eq!(mapper.map(Command::new(-1.0, 0.0)).steering_angle_deg, 180.0);
        assert_eq!(mapper.map(Command::new(0.0, 0.0)).steering_angle_deg, 90.0);
        assert_eq!(mapper.map(Command::new(1.0, 0.0)).steering_angle_deg, 0.0);
    }

    #[test]
    fn test_servo_policy_stays_in_travel() {
        let mapper = RangeMapper::new(SteeringPolicy::Servo);
        for s in [
            -1e300,
            -42.0,
            -1.5,
            -0.999,
            -0.25,
            0.3,
            0.75,
            1.0001,
            9.0,
            1e300,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ] {
            let angle = mapper.map(Command::new(s, 0.0)).steering_angle_deg;
            assert!((0.0..=180.0).contains(&angle), "{} -> {}", s, angle);
        }
    }

    #[test]
    fn test_scenario_half_right_reverse() {
        let signal = RangeMapper::default().map(Command::new(0.5, -0.3));
        assert_relative_eq!(signal.steering_angle_deg, 45.0);
        assert_relative_eq!(signal.throttle, -0.3);
    }

    #[test]
    fn test_throttle_clamp_and_identity() {
        let mapper = RangeMapper::default();
        assert_eq!(mapper.map(Command::new(0.0, 2.0)).throttle, 1.0);
        assert_eq!(mapper.map(Command::new(0.0, -3.0)).throttle, -1.0);
        assert_eq!(mapper.map(Command::new(0.0, f64::INFINITY)).throttle, 1.0);
        for t in [-1.0, -0.5, -0.3, 0.0, 0.1, 0.99, 1.0] {
            assert_eq!(mapper.map(Command::new(0.0, t)).throttle, t);
        }
    }

    #[test]
    fn test_alternate_policy_range() {
        let mapper = RangeMapper::new(SteeringPolicy::Alternate);
        assert_eq!(mapper.map(Command::new(-1.0, 0.0)).steering_angle_deg, 90.0);
        assert_eq!(mapper.map(Command::new(0.0, 0.0)).steering_angle_deg, -90.0);
        assert_eq!(mapper.map(Command::new(1.0, 0.0)).steering_angle_deg, -270.0);
        assert_eq!(mapper.map(Command::new(5.0, 0.0)).steering_angle_deg, -270.0);
        assert!(!SteeringPolicy::Alternate.is_range_safe());
        assert!(SteeringPolicy::Servo.is_range_safe());
    }
}
