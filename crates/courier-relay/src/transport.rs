//! Transport abstraction: frames, the write half, the read half and the
//! shared read/write deadlines.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

/// One transport frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame. Never relayed, only logged.
    Binary(Vec<u8>),
    /// Ping control frame.
    Ping(Vec<u8>),
    /// Pong control frame.
    Pong(Vec<u8>),
    /// Close frame.
    Close,
}

/// Transport failure. Always terminal for the connection that hit it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("transport closed")]
    Closed,
    /// A read or write deadline expired.
    #[error("transport deadline exceeded")]
    Timeout,
    /// Any other I/O or protocol error.
    #[error("transport error: {0}")]
    Io(String),
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one frame.
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send a close frame (if the protocol has one) and release the transport.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Stand-in for "never" when now + timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Read and write deadlines shared by the reader, the writer and the
/// keepalive monitor.
#[derive(Debug)]
pub struct Deadlines {
    timeout: Duration,
    read: Mutex<Instant>,
    write: Mutex<Instant>,
}

impl Deadlines {
    /// Both deadlines start at now + `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let at = deadline_after(timeout);
        Self {
            timeout,
            read: Mutex::new(at),
            write: Mutex::new(at),
        }
    }

    /// Push both deadlines to now + timeout.
    pub fn refresh(&self) {
        let at = deadline_after(self.timeout);
        *self.read.lock() = at;
        *self.write.lock() = at;
    }

    /// Current read deadline.
    pub fn read_deadline(&self) -> Instant {
        *self.read.lock()
    }

    /// Current write deadline.
    pub fn write_deadline(&self) -> Instant {
        *self.write.lock()
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
