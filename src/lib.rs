//! Chalak - remote drive receiver for a servo-steered robot car
//!
//! Connects to a command source over TCP, reads 16-byte steering/throttle
//! frames and drives a steering servo and an ESC through a PCA9685 PWM board.
//! The link is kept alive across drops with backoff-paced reconnects.
//!
//! ## Features
//!
//! - `rppal`: real I2C access on Raspberry Pi (Linux only)

pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod motion;
pub mod shutdown;
pub mod streaming;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
