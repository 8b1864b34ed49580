//! Mapping of decoded commands onto actuator ranges

pub mod mapper;

pub use mapper::{RangeMapper, SteeringPolicy};
