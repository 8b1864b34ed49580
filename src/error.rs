//! Error types for Chalak

use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Chalak error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the command link (reset, broken pipe, refused, unreachable)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream (zero-length read)
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// No bytes received within the configured idle window
    #[error("Link idle for {idle_ms} ms")]
    LinkIdle {
        /// Milliseconds since the last byte arrived
        idle_ms: u64,
    },

    /// Endpoint could not be resolved to any socket address
    #[error("Could not resolve endpoint: {0}")]
    Unresolved(String),

    /// Buffer handed to the codec is not exactly one frame long
    #[error("Malformed frame: expected 16 bytes, got {len}")]
    MalformedFrame {
        /// Length of the rejected buffer
        len: usize,
    },

    /// Frame decoded but carries values that cannot be applied
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Actuator or bus initialization failed
    #[error("Hardware initialization failed: {0}")]
    HardwareInit(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Shutdown was requested while an operation was in progress
    #[error("Shutdown requested")]
    Shutdown,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// What the command loop does with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Close the link and connect again
    Reconnect,
    /// Drop the offending frame, keep the link
    Skip,
    /// Leave the loop cleanly
    Stop,
    /// Startup-only failure; the process must not enter the loop
    Fatal,
}

impl Error {
    /// Classify this error for the command loop.
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Io(_) | Error::ConnectionClosed | Error::LinkIdle { .. } => {
                Disposition::Reconnect
            }
            Error::Unresolved(_) => Disposition::Reconnect,
            Error::MalformedFrame { .. } | Error::InvalidCommand(_) => Disposition::Skip,
            Error::Shutdown => Disposition::Stop,
            Error::HardwareInit(_) | Error::Config(_) | Error::InvalidParameter(_) => {
                Disposition::Fatal
            }
            Error::Other(_) => Disposition::Skip,
        }
    }

    /// Idle-watchdog error for the given elapsed time.
    pub(crate) fn link_idle(elapsed: Duration) -> Self {
        Error::LinkIdle {
            idle_ms: elapsed.as_millis() as u64,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_link_errors_reconnect() {
        let reset = Error::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(reset.disposition(), Disposition::Reconnect);
        assert_eq!(Error::ConnectionClosed.disposition(), Disposition::Reconnect);
        assert_eq!(
            Error::link_idle(Duration::from_secs(3)).disposition(),
            Disposition::Reconnect
        );
    }

    #[test]
    fn test_frame_errors_skip() {
        assert_eq!(
            Error::MalformedFrame { len: 10 }.disposition(),
            Disposition::Skip
        );
        assert_eq!(
            Error::InvalidCommand("NaN steering".into()).disposition(),
            Disposition::Skip
        );
    }

    #[test]
    fn test_startup_errors_fatal() {
        assert_eq!(
            Error::HardwareInit("no i2c".into()).disposition(),
            Disposition::Fatal
        );
        assert_eq!(Error::Shutdown.disposition(), Disposition::Stop);
    }

    #[test]
    fn test_malformed_message() {
        let e = Error::MalformedFrame { len: 10 };
        assert_eq!(e.to_string(), "Malformed frame: expected 16 bytes, got 10");
    }
}
