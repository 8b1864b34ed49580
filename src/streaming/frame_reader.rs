//! Accumulating frame reader
//!
//! TCP delivers bytes, not frames. A read may return part of a frame, several
//! frames, or a frame and a half. The reader keeps the remainder between
//! calls and only ever hands out whole 16-byte frames.
//!
//! # Short Reads
//!
//! | Situation                           | Result                              |
//! |-------------------------------------|-------------------------------------|
//! | Partial frame, then read timeout    | `Ok(None)`, partial bytes kept      |
//! | Partial frame, then zero-length read| `ConnectionClosed`, partial dropped |
//! | Zero-length read at frame boundary  | `ConnectionClosed`                  |

use super::link::Link;
use crate::core::types::{FRAME_LEN, RawFrame};
use crate::error::{Error, Result};
use log::{debug, trace};
use std::io::{self, ErrorKind};
use std::time::Instant;

/// Bytes requested per read call
const READ_CHUNK: usize = 512;

/// Reassembles fixed-size frames from a byte stream
#[derive(Debug)]
pub struct FrameReader {
    /// Received bytes not yet handed out as frames
    pending: Vec<u8>,
    /// Peer closed during a non-blocking drain; reported on next blocking read
    peer_closed: bool,
    /// When the last byte arrived
    last_activity: Instant,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(READ_CHUNK),
            peer_closed: false,
            last_activity: Instant::now(),
        }
    }

    /// Block (up to the link's read timeout) until one whole frame is available.
    ///
    /// Returns `Ok(None)` if the read timed out first.
    pub fn read_frame<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<Option<RawFrame>> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.pop_ready() {
                return Ok(Some(frame));
            }
            if self.peer_closed {
                return Err(self.closed());
            }

            match link.read(&mut chunk) {
                Ok(0) => return Err(self.closed()),
                Ok(n) => self.accept(&chunk[..n]),
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Read everything already buffered on the link without blocking.
    ///
    /// Keeps reading until the link has nothing more (or the peer closed).
    /// Whole frames are handed to `on_frame` after every chunk, so only a
    /// trailing partial frame stays buffered however large the backlog is.
    /// A close seen here is remembered and reported by the next
    /// [`read_frame`](Self::read_frame), so frames that arrived just before
    /// the close are still delivered.
    pub fn drain_available<L, F>(&mut self, link: &mut L, mut on_frame: F) -> Result<()>
    where
        L: Link + ?Sized,
        F: FnMut(RawFrame),
    {
        let mut chunk = [0u8; READ_CHUNK];
        self.emit_ready(&mut on_frame);

        while !self.peer_closed {
            match link.try_read(&mut chunk) {
                Ok(0) => self.peer_closed = true,
                Ok(n) => {
                    self.accept(&chunk[..n]);
                    self.emit_ready(&mut on_frame);
                }
                Err(e) if is_timeout(&e) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Take the next complete frame already buffered
    pub fn pop_ready(&mut self) -> Option<RawFrame> {
        if self.pending.len() < FRAME_LEN {
            return None;
        }
        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&self.pending[..FRAME_LEN]);
        self.pending.drain(..FRAME_LEN);
        Some(frame)
    }

    /// Bytes buffered that do not yet form a frame (or several)
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Time of the most recent byte (or of the last reset)
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Forget all state; used when the link is replaced
    pub fn reset(&mut self) {
        self.pending.clear();
        self.peer_closed = false;
        self.last_activity = Instant::now();
    }

    fn emit_ready<F: FnMut(RawFrame)>(&mut self, on_frame: &mut F) {
        while let Some(frame) = self.pop_ready() {
            on_frame(frame);
        }
    }

    fn accept(&mut self, bytes: &[u8]) {
        trace!("Received {} bytes", bytes.len());
        self.pending.extend_from_slice(bytes);
        self.last_activity = Instant::now();
    }

    fn closed(&mut self) -> Error {
        if !self.pending.is_empty() {
            debug!(
                "Peer closed with {} bytes of an incomplete frame; discarding",
                self.pending.len()
            );
            self.pending.clear();
        }
        Error::ConnectionClosed
    }
}

/// Read timeouts show up as `WouldBlock` on Unix and `TimedOut` on Windows
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Command;
    use crate::streaming::link::Connector;
    use crate::streaming::mock::{ConnectOutcome, LinkEvent, ScriptedConnector, ScriptedLink};
    use crate::streaming::wire::{decode_frame, encode};

    fn link(events: Vec<LinkEvent>) -> ScriptedLink {
        ScriptedConnector::new(vec![ConnectOutcome::Accept(events)])
            .connect()
            .unwrap()
    }

    fn frame_bytes(steering: f64, throttle: f64) -> Vec<u8> {
        encode(&Command::new(steering, throttle)).to_vec()
    }

    #[test]
    fn test_whole_frame() {
        let mut link = link(vec![LinkEvent::Data(frame_bytes(0.5, -0.3))]);
        let mut reader = FrameReader::new();
        let frame = reader.read_frame(&mut link).unwrap().unwrap();
        assert_eq!(decode_frame(&frame), Command::new(0.5, -0.3));
        assert_eq!(reader.pending_len(), 0);
    }

    #[test]
    fn test_split_frame_is_accumulated() {
        let bytes = frame_bytes(0.25, 0.75);
        let mut link = link(vec![
            LinkEvent::Data(bytes[..5].to_vec()),
            LinkEvent::Data(bytes[5..11].to_vec()),
            LinkEvent::Data(bytes[11..].to_vec()),
        ]);
        let mut reader = FrameReader::new();
        let frame = reader.read_frame(&mut link).unwrap().unwrap();
        assert_eq!(decode_frame(&frame), Command::new(0.25, 0.75));
    }

    #[test]
    fn test_timeout_keeps_partial_bytes() {
        let bytes = frame_bytes(-1.0, 1.0);
        let mut link = link(vec![
            LinkEvent::Data(bytes[..10].to_vec()),
            LinkEvent::Timeout,
            LinkEvent::Data(bytes[10..].to_vec()),
        ]);
        let mut reader = FrameReader::new();
        assert!(reader.read_frame(&mut link).unwrap().is_none());
        assert_eq!(reader.pending_len(), 10);
        let frame = reader.read_frame(&mut link).unwrap().unwrap();
        assert_eq!(decode_frame(&frame), Command::new(-1.0, 1.0));
    }

    #[test]
    fn test_partial_then_close_is_connection_closed() {
        let mut link = link(vec![LinkEvent::Data(vec![0xAB; 10]), LinkEvent::Closed]);
        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.read_frame(&mut link),
            Err(Error::ConnectionClosed)
        ));
        assert_eq!(reader.pending_len(), 0);
    }

    #[test]
    fn test_zero_length_read_is_connection_closed() {
        let mut link = link(vec![LinkEvent::Closed]);
        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.read_frame(&mut link),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_reset_error_is_io() {
        let mut link = link(vec![LinkEvent::Fail(ErrorKind::ConnectionReset)]);
        let mut reader = FrameReader::new();
        match reader.read_frame(&mut link) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_drain_collects_queued_frames_then_reports_close() {
        let mut burst = Vec::new();
        for i in 0..5 {
            burst.extend(frame_bytes(i as f64 / 10.0, 0.0));
        }
        let mut link = link(vec![
            LinkEvent::Data(burst[..16].to_vec()),
            LinkEvent::Data(burst[16..].to_vec()),
            LinkEvent::Closed,
        ]);
        let mut reader = FrameReader::new();

        let first = reader.read_frame(&mut link).unwrap().unwrap();
        assert_eq!(decode_frame(&first).steering, 0.0);

        let mut rest = Vec::new();
        reader
            .drain_available(&mut link, |frame| rest.push(decode_frame(&frame).steering))
            .unwrap();
        assert_eq!(rest, vec![0.1, 0.2, 0.3, 0.4]);

        assert!(matches!(
            reader.read_frame(&mut link),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_drain_empties_large_backlog() {
        let mut backlog = Vec::new();
        for i in 0..300 {
            backlog.extend(frame_bytes(i as f64, 0.0));
        }
        // Trailing partial frame stays buffered
        backlog.extend_from_slice(&[0x11; 7]);
        let mut link = link(vec![LinkEvent::Data(backlog), LinkEvent::Timeout]);
        let mut reader = FrameReader::new();

        let first = reader.read_frame(&mut link).unwrap().unwrap();
        assert_eq!(decode_frame(&first).steering, 0.0);

        let mut count = 0;
        let mut last = None;
        reader
            .drain_available(&mut link, |frame| {
                count += 1;
                last = Some(decode_frame(&frame).steering);
            })
            .unwrap();
        assert_eq!(count, 299);
        assert_eq!(last, Some(299.0));
        assert_eq!(reader.pending_len(), 7);
    }
}
