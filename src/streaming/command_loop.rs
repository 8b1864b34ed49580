//! Receive loop: connect, read frames, apply the newest command
//!
//! # Pipeline
//!
//! ```text
//! ConnectionManager ──▶ RawFrame(s) ──▶ decode ──▶ validate ──▶ RangeMapper ──▶ ActuatorSink
//!        ▲                                                                        │
//!        └──────────── reconnect on link error (optionally neutral first) ◀──────┘
//! ```
//!
//! # Error Handling
//!
//! | Disposition | Errors                                   | Action                    |
//! |-------------|------------------------------------------|---------------------------|
//! | Reconnect   | `ConnectionClosed`, `Io`, `LinkIdle`     | close, connect, resume    |
//! | Skip        | `MalformedFrame`, `InvalidCommand`       | warn, drop the frame      |
//! | Skip        | `Other`                                  | warn, continue            |
//! | Stop        | `Shutdown`                               | leave the loop            |
//!
//! Frames are never queued. Each cycle drains everything the link already
//! holds and only the newest valid frame reaches the actuators.

use super::connection::ConnectionManager;
use super::link::Connector;
use super::wire::decode_frame;
use crate::core::actuator::ActuatorSink;
use crate::core::types::{ActuatorSignal, Command, RawFrame};
use crate::error::{Disposition, Error, Result};
use crate::motion::RangeMapper;
use crate::shutdown::Shutdown;
use log::{debug, error, info, warn};
use std::fmt;
use std::time::{Duration, Instant};

/// Counters for one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Whole frames read off the link
    pub frames_received: u64,
    /// Signals handed to the actuators
    pub frames_applied: u64,
    /// Valid frames dropped because a newer one was already waiting
    pub frames_superseded: u64,
    /// Frames dropped as malformed or invalid
    pub frames_rejected: u64,
    /// Successful connects after the first
    pub reconnects: u64,
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} applied={} superseded={} rejected={} reconnects={}",
            self.frames_received,
            self.frames_applied,
            self.frames_superseded,
            self.frames_rejected,
            self.reconnects
        )
    }
}

/// Drives the actuators from the remote command stream
pub struct CommandLoop<C: Connector, S: ActuatorSink> {
    connection: ConnectionManager<C>,
    sink: S,
    mapper: RangeMapper,
    shutdown: Shutdown,
    neutral_on_disconnect: bool,
    stats_interval: Option<Duration>,
    stats: LoopStats,
}

/// Newest valid command among the frames read in one cycle
#[derive(Debug, Default)]
struct Selection {
    newest: Option<Command>,
    received: u64,
    superseded: u64,
    rejected: u64,
}

impl Selection {
    fn offer(&mut self, frame: &RawFrame) {
        self.received += 1;
        match decode_frame(frame).validate() {
            Ok(cmd) => {
                if self.newest.replace(cmd).is_some() {
                    self.superseded += 1;
                }
            }
            Err(e) => {
                self.rejected += 1;
                warn!("Dropping frame: {}", e);
            }
        }
    }
}

impl<C: Connector, S: ActuatorSink> CommandLoop<C, S> {
    /// Create a loop that has not connected yet; `run` does the connecting
    pub fn new(
        connection: ConnectionManager<C>,
        sink: S,
        mapper: RangeMapper,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            connection,
            sink,
            mapper,
            shutdown,
            neutral_on_disconnect: false,
            stats_interval: None,
            stats: LoopStats::default(),
        }
    }

    /// Center steering and stop the motor whenever the link drops
    pub fn with_neutral_on_disconnect(mut self, enabled: bool) -> Self {
        self.neutral_on_disconnect = enabled;
        self
    }

    /// Log statistics every `interval`; zero disables periodic reports
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Counters so far
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// The actuator sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run until shutdown is requested.
    ///
    /// Link failures never end the loop; they lead to a reconnect.
    pub fn run(&mut self) -> LoopStats {
        info!(
            "Command loop started (sink: {}, steering policy: {:?})",
            self.sink.name(),
            self.mapper.policy()
        );
        let mut last_report = Instant::now();

        while !self.shutdown.is_triggered() {
            if !self.connection.is_connected() {
                match self.connection.connect() {
                    Ok(()) => {
                        self.stats.reconnects = self.connection.connect_count().saturating_sub(1);
                    }
                    Err(e) if e.disposition() == Disposition::Stop => break,
                    Err(e) => {
                        warn!("Connect failed: {}", e);
                        continue;
                    }
                }
            }

            if let Err(e) = self.step()
                && !self.handle_error(e)
            {
                break;
            }

            if let Some(interval) = self.stats_interval
                && last_report.elapsed() >= interval
            {
                info!("Stats: {}", self.stats);
                last_report = Instant::now();
            }
        }

        self.connection.close();
        info!("Command loop stopped. {}", self.stats);
        self.stats
    }

    /// One receive cycle: wait for a frame, drain the rest of the backlog, apply the newest
    fn step(&mut self) -> Result<()> {
        let Some(first) = self.connection.receive_frame()? else {
            return Ok(());
        };

        let mut selection = Selection::default();
        selection.offer(&first);
        // A link error during the drain must not lose the frames already read
        let link_error = self
            .connection
            .drain_ready(|frame| selection.offer(&frame))
            .err();

        self.stats.frames_received += selection.received;
        self.stats.frames_superseded += selection.superseded;
        self.stats.frames_rejected += selection.rejected;
        if selection.received > 1 {
            debug!("Burst of {} frames, applying newest", selection.received);
        }
        if let Some(cmd) = selection.newest {
            let signal = self.mapper.map(cmd);
            self.apply(signal);
        }
        link_error.map_or(Ok(()), Err)
    }

    /// React to a cycle error. Returns `false` when the loop must stop.
    fn handle_error(&mut self, e: Error) -> bool {
        match e.disposition() {
            Disposition::Reconnect => {
                warn!("Link lost: {}, reconnecting", e);
                self.on_link_lost();
            }
            // Frame errors are counted where frames are decoded
            Disposition::Skip => warn!("Command loop: {}", e),
            Disposition::Stop => return false,
            Disposition::Fatal => error!("Unexpected error in command loop: {}", e),
        }
        true
    }

    fn apply(&mut self, signal: ActuatorSignal) {
        debug!(
            "Steering {:.1}°, throttle {:.3}",
            signal.steering_angle_deg, signal.throttle
        );
        self.sink.apply(signal);
        self.stats.frames_applied += 1;
    }

    fn on_link_lost(&mut self) {
        self.connection.close();
        if self.neutral_on_disconnect {
            info!("Link lost, returning actuators to neutral");
            self.sink.apply(ActuatorSignal::NEUTRAL);
        }
    }
}
