//! Link abstraction for the command stream
//!
//! [`Connector`] opens links, [`Link`] is one open byte stream. The TCP
//! implementation is the only one used in production; the scripted
//! implementation in [`super::mock`] drives the same code paths in tests.

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use log::{debug, warn};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// One open, ordered, reliable byte stream
pub trait Link: Read + Send {
    /// Read whatever is already buffered without blocking.
    ///
    /// `Ok(0)` still means the peer closed the stream; `WouldBlock` means
    /// nothing is pending.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the underlying resource. Must be idempotent.
    fn close(&mut self);

    /// Peer description for logs
    fn peer(&self) -> String;
}

/// Factory for links to the command source
pub trait Connector: Send {
    type Link: Link;

    /// Make a single connection attempt
    fn connect(&mut self) -> Result<Self::Link>;

    /// Endpoint description for logs
    fn endpoint(&self) -> String;
}

/// TCP connection to the command source
pub struct TcpLink {
    stream: TcpStream,
    peer: String,
    closed: bool,
}

impl TcpLink {
    /// Wrap a connected stream, applying the read timeout
    pub fn new(stream: TcpStream, read_timeout: Duration) -> Result<Self> {
        stream.set_read_timeout(Some(read_timeout))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Self {
            stream,
            peer,
            closed: false,
        })
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Link for TcpLink {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_nonblocking(true)?;
        let result = self.stream.read(buf);
        self.stream.set_nonblocking(false)?;
        result
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // NotConnected is expected when the peer already went away
        if let Err(e) = self.stream.shutdown(Shutdown::Both)
            && e.kind() != io::ErrorKind::NotConnected
        {
            debug!("Socket shutdown for {}: {}", self.peer, e);
        }
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connects to `host:port` from configuration
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector from the connection section of the config
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    /// Resolve the endpoint. Done per attempt so DNS changes are picked up.
    fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::Unresolved(format!("{}: {}", self.endpoint(), e)))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Unresolved(self.endpoint()));
        }
        Ok(addrs)
    }
}

impl Connector for TcpConnector {
    type Link = TcpLink;

    fn connect(&mut self) -> Result<TcpLink> {
        let mut last_err = None;
        for addr in self.resolve()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return TcpLink::new(stream, self.read_timeout),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .map(Error::Io)
            .unwrap_or_else(|| Error::Unresolved(self.endpoint())))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    fn connector_for(listener: &TcpListener) -> TcpConnector {
        let config = ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
            read_timeout_ms: 100,
            ..ConnectionConfig::default()
        };
        TcpConnector::new(&config)
    }

    #[test]
    fn test_connect_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut connector = connector_for(&listener);

        let mut link = connector.connect().unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        peer.write_all(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 8];
        let n = link.read(&mut buf).unwrap();
        assert!(n > 0);
        assert_eq!(buf[0], 1);
    }

    #[test]
    fn test_try_read_would_block_when_idle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut connector = connector_for(&listener);
        let mut link = connector.connect().unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let mut buf = [0u8; 8];
        let err = link.try_read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_refused_is_io_error() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..ConnectionConfig::default()
        };
        let mut connector = TcpConnector::new(&config);
        assert!(matches!(connector.connect(), Err(Error::Io(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut connector = connector_for(&listener);
        let mut link = connector.connect().unwrap();
        link.close();
        link.close();
    }
}
