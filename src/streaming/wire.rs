//! Wire format for drive commands
//!
//! # Frame Layout
//!
//! Every command is exactly 16 bytes. There is no delimiter, length prefix or
//! checksum; frame boundaries come from the fixed size and the ordered,
//! reliable byte stream underneath.
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────┐
//! │ Steering (8 bytes)       │ Throttle (8 bytes)       │
//! │ Big-endian IEEE-754 f64  │ Big-endian IEEE-754 f64  │
//! └──────────────────────────┴──────────────────────────┘
//! ```
//!
//! Decoding is a pure bit reinterpretation. Values are not clamped here;
//! range handling lives in [`crate::motion::RangeMapper`].

use crate::core::types::{Command, FRAME_LEN, RawFrame};
use crate::error::{Error, Result};

/// Decode a buffer that must hold exactly one frame.
pub fn decode(bytes: &[u8]) -> Result<Command> {
    let frame: &RawFrame = bytes
        .try_into()
        .map_err(|_| Error::MalformedFrame { len: bytes.len() })?;
    Ok(decode_frame(frame))
}

/// Decode a fixed-size frame.
#[inline]
pub fn decode_frame(frame: &RawFrame) -> Command {
    let mut steering = [0u8; 8];
    let mut throttle = [0u8; 8];
    steering.copy_from_slice(&frame[..8]);
    throttle.copy_from_slice(&frame[8..FRAME_LEN]);

    Command {
        steering: f64::from_be_bytes(steering),
        throttle: f64::from_be_bytes(throttle),
    }
}

/// Encode a command into the wire layout.
#[inline]
pub fn encode(cmd: &Command) -> RawFrame {
    let mut frame = [0u8; FRAME_LEN];
    frame[..8].copy_from_slice(&cmd.steering.to_be_bytes());
    frame[8..].copy_from_slice(&cmd.throttle.to_be_bytes());
    frame
}
