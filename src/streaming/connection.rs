//! Connection lifecycle for the command stream
//!
//! # State Machine
//!
//! ```text
//!                 connect()
//!  Disconnected ─────────────▶ Connecting{attempt, next_backoff}
//!       ▲                          │   ▲
//!       │ close()        success   │   │ failure: wait backoff,
//!       │                          ▼   │ attempt += 1
//!       └──────────────────── Connected
//!                 receive error ──▶ close() ──▶ connect() ...
//! ```
//!
//! There is never more than one live link: `connect()` closes the previous
//! one before the first new attempt. Attempts continue until one succeeds or
//! shutdown is requested; backoff waits are cut short only by shutdown.

use super::backoff::Backoff;
use super::frame_reader::FrameReader;
use super::link::{Connector, Link};
use crate::core::types::RawFrame;
use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use log::{debug, info, warn};
use std::time::Duration;

/// Observable connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link and no attempt in progress
    Disconnected,
    /// Attempting to connect
    Connecting {
        /// 1-based number of the attempt in progress
        attempt: u32,
        /// Wait before the next attempt if this one fails
        next_backoff: Duration,
    },
    /// Link established
    Connected {
        /// Peer description
        peer: String,
    },
}

/// Owns the single link to the command source
pub struct ConnectionManager<C: Connector> {
    connector: C,
    link: Option<C::Link>,
    state: ConnectionState,
    reader: FrameReader,
    backoff: Backoff,
    shutdown: Shutdown,
    idle_timeout: Option<Duration>,
    /// Successful connects over the process lifetime
    connects: u64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager in the `Disconnected` state
    pub fn new(connector: C, backoff: Backoff, shutdown: Shutdown) -> Self {
        Self {
            connector,
            link: None,
            state: ConnectionState::Disconnected,
            reader: FrameReader::new(),
            backoff,
            shutdown,
            idle_timeout: None,
            connects: 0,
        }
    }

    /// Treat the link as dead after `timeout` without any bytes
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Current state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Whether a link is currently held
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Successful connects so far (the first one included)
    pub fn connect_count(&self) -> u64 {
        self.connects
    }

    /// Connect, retrying with backoff until success or shutdown.
    ///
    /// Any existing link is closed first. Returns [`Error::Shutdown`] only if
    /// shutdown was requested before a connection succeeded.
    pub fn connect(&mut self) -> Result<()> {
        self.close();
        self.backoff.reset();
        let endpoint = self.connector.endpoint();
        let mut attempt: u32 = 1;

        loop {
            if self.shutdown.is_triggered() {
                self.state = ConnectionState::Disconnected;
                return Err(Error::Shutdown);
            }

            self.state = ConnectionState::Connecting {
                attempt,
                next_backoff: self.backoff.peek(),
            };
            debug!("Connecting to {} (attempt #{})", endpoint, attempt);

            match self.connector.connect() {
                Ok(link) => {
                    let peer = link.peer();
                    info!("Connected to {} (after {} attempt(s))", peer, attempt);
                    self.reader.reset();
                    self.link = Some(link);
                    self.state = ConnectionState::Connected { peer };
                    self.connects += 1;
                    return Ok(());
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        "Connection to {} failed: {}, retrying in {:.1}s...",
                        endpoint,
                        e,
                        delay.as_secs_f64()
                    );
                    if self.shutdown.wait_timeout(delay) {
                        self.state = ConnectionState::Disconnected;
                        return Err(Error::Shutdown);
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Wait (up to the read timeout) for the next whole frame.
    ///
    /// `Ok(None)` means the read timed out with no complete frame; partial
    /// bytes are kept for the next call. Errors are connection-level: the
    /// caller is expected to reconnect.
    pub fn receive_frame(&mut self) -> Result<Option<RawFrame>> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| Error::Other("receive on a closed connection".to_string()))?;

        let frame = self.reader.read_frame(link)?;
        if frame.is_none()
            && let Some(limit) = self.idle_timeout
        {
            let idle = self.reader.last_activity().elapsed();
            if idle >= limit {
                return Err(Error::link_idle(idle));
            }
        }
        Ok(frame)
    }

    /// Hand every further frame already received to `on_frame`, without blocking.
    ///
    /// Reads until the link has nothing more pending, so no backlog is left
    /// behind for the next cycle. A close noticed here is reported by the
    /// next `receive_frame`.
    pub fn drain_ready<F: FnMut(RawFrame)>(&mut self, on_frame: F) -> Result<()> {
        match self.link.as_mut() {
            Some(link) => self.reader.drain_available(link, on_frame),
            None => Ok(()),
        }
    }

    /// Release the current link, if any. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            debug!("Closing link to {}", link.peer());
            link.close();
        }
        self.reader.reset();
        self.state = ConnectionState::Disconnected;
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.close();
    }
}
