//! Ping/pong liveness for authenticated connections.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::metrics::KEEPALIVE_TIMEOUTS_TOTAL;
use crate::transport::Frame;
use crate::writer::GatedWriter;

/// Payload of every keepalive ping.
const PING_PAYLOAD: &[u8] = b"ping";

/// Outcome of the keepalive loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    /// The keepalive was cancelled by teardown.
    Cancelled,
    /// No pong within the timeout.
    TimedOut,
    /// A ping could not be written.
    WriteFailed,
}

/// Time of the most recent pong, shared between the reader and the
/// keepalive loop.
#[derive(Debug)]
pub struct PongTracker {
    last: Mutex<Instant>,
}

impl PongTracker {
    /// Start tracking from now.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Record a pong.
    pub fn record(&self) {
        *self.last.lock() = Instant::now();
    }

    /// Time since the last pong.
    pub fn elapsed(&self) -> Duration {
        self.last.lock().elapsed()
    }
}

impl Default for PongTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the keepalive loop for one connection.
///
/// Each round refreshes the read and write deadlines, sends a ping, sleeps
/// half the timeout and then checks when the last pong arrived. It does not
/// close anything itself: once it stops refreshing, the reader's deadline
/// expires and the connection is torn down through the normal path.
pub async fn run_keepalive(
    writer: Arc<GatedWriter>,
    pongs: Arc<PongTracker>,
    cancel: CancellationToken,
) -> KeepaliveOutcome {
    let deadlines = Arc::clone(writer.deadlines());
    let timeout = deadlines.timeout();
    let started = Instant::now();
    pongs.record();

    loop {
        if cancel.is_cancelled() {
            debug!("keepalive terminated");
            return KeepaliveOutcome::Cancelled;
        }

        deadlines.refresh();
        debug!("sending ping");
        if let Err(error) = writer.write(Frame::Ping(PING_PAYLOAD.to_vec())).await {
            error!(%error, "unable to write ping");
            return KeepaliveOutcome::WriteFailed;
        }

        tokio::select! {
            () = cancel.cancelled() => {
                debug!("keepalive terminated");
                return KeepaliveOutcome::Cancelled;
            }
            () = tokio::time::sleep(timeout / 2) => {}
        }

        if pongs.elapsed() > timeout {
            error!(
                session_length = ?started.elapsed(),
                "ping timeout exceeded"
            );
            counter!(KEEPALIVE_TIMEOUTS_TOTAL).increment(1);
            return KeepaliveOutcome::TimedOut;
        }
    }
}
