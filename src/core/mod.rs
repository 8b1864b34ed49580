//! Core types and the actuator sink interface

pub mod actuator;
pub mod types;

pub use actuator::ActuatorSink;
pub use types::{ActuatorSignal, Command, FRAME_LEN, RawFrame};
