//! Command stream: TCP link, framing, reconnects and the receive loop

pub mod backoff;
pub mod command_loop;
pub mod connection;
pub mod frame_reader;
pub mod link;
pub mod mock;
pub mod wire;

pub use backoff::{Backoff, BackoffStrategy};
pub use command_loop::{CommandLoop, LoopStats};
pub use connection::{ConnectionManager, ConnectionState};
pub use frame_reader::FrameReader;
pub use link::{Connector, Link, TcpConnector, TcpLink};
