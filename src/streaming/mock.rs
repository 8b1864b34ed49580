//! Scripted links for exercising the connection code without sockets

use super::link::{Connector, Link};
use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::Arc;

/// One step of a scripted link
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Bytes become readable (may be split across reads)
    Data(Vec<u8>),
    /// A read times out with nothing available
    Timeout,
    /// Peer closes the stream (zero-length read from here on)
    Closed,
    /// Read fails with this error kind
    Fail(io::ErrorKind),
}

/// Link that replays a fixed sequence of events.
///
/// An exhausted script behaves like a closed peer.
pub struct ScriptedLink {
    events: VecDeque<LinkEvent>,
    stats: Arc<Mutex<ScriptStats>>,
    id: usize,
    closed: bool,
}

impl ScriptedLink {
    fn pop_data(&mut self, buf: &mut [u8], data: Vec<u8>) -> usize {
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
            self.events.push_front(LinkEvent::Data(data[n..].to_vec()));
        }
        n
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.events.pop_front() {
            Some(LinkEvent::Data(data)) => Ok(self.pop_data(buf, data)),
            Some(LinkEvent::Timeout) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Some(LinkEvent::Closed) | None => {
                self.events.push_front(LinkEvent::Closed);
                Ok(0)
            }
            Some(LinkEvent::Fail(kind)) => Err(io::Error::from(kind)),
        }
    }
}

impl Link for ScriptedLink {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.events.front() {
            Some(LinkEvent::Closed) | None => return Ok(0),
            // Timeouts and failures surface on the next blocking read
            Some(LinkEvent::Timeout) | Some(LinkEvent::Fail(_)) => {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            Some(LinkEvent::Data(_)) => {}
        }
        match self.events.pop_front() {
            Some(LinkEvent::Data(data)) => Ok(self.pop_data(buf, data)),
            _ => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.lock().closes += 1;
        }
    }

    fn peer(&self) -> String {
        format!("scripted#{}", self.id)
    }
}

/// Outcome of one scripted connect attempt
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// Connection succeeds and replays these events
    Accept(Vec<LinkEvent>),
    /// Connection attempt fails with this error kind
    Refuse(io::ErrorKind),
}

/// Counters shared between a [`ScriptedConnector`] and its links
#[derive(Debug, Clone, Default)]
pub struct ScriptStats {
    /// Connect attempts made
    pub attempts: usize,
    /// Successful connections
    pub accepted: usize,
    /// Links closed
    pub closes: usize,
}

/// Connector that replays a list of outcomes.
///
/// Once the list runs out every attempt is refused, and the attached
/// shutdown token (if any) is triggered so loops under test terminate.
pub struct ScriptedConnector {
    outcomes: VecDeque<ConnectOutcome>,
    stats: Arc<Mutex<ScriptStats>>,
    shutdown_when_exhausted: Option<Shutdown>,
}

impl ScriptedConnector {
    /// Create a connector replaying `outcomes` in order
    pub fn new(outcomes: Vec<ConnectOutcome>) -> Self {
        Self {
            outcomes: outcomes.into(),
            stats: Arc::new(Mutex::new(ScriptStats::default())),
            shutdown_when_exhausted: None,
        }
    }

    /// Trigger `shutdown` once the script has been used up
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown_when_exhausted = Some(shutdown);
        self
    }

    /// Shared counters, readable after the connector has been moved
    pub fn stats(&self) -> Arc<Mutex<ScriptStats>> {
        Arc::clone(&self.stats)
    }
}

impl Connector for ScriptedConnector {
    type Link = ScriptedLink;

    fn connect(&mut self) -> Result<ScriptedLink> {
        let mut stats = self.stats.lock();
        stats.attempts += 1;

        match self.outcomes.pop_front() {
            Some(ConnectOutcome::Accept(events)) => {
                stats.accepted += 1;
                Ok(ScriptedLink {
                    events: events.into(),
                    stats: Arc::clone(&self.stats),
                    id: stats.accepted,
                    closed: false,
                })
            }
            Some(ConnectOutcome::Refuse(kind)) => Err(Error::Io(io::Error::from(kind))),
            None => {
                if let Some(shutdown) = &self.shutdown_when_exhausted {
                    shutdown.trigger();
                }
                Err(Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused)))
            }
        }
    }

    fn endpoint(&self) -> String {
        "scripted".to_string()
    }
}
