//! In-memory transport for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::{Frame, FrameSink, FrameStream, TransportError};

/// Server-side write half backed by a channel.
pub(crate) struct MemorySink {
    outbound: mpsc::UnboundedSender<Frame>,
    fail: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.stall.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".into()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The client end of a [`memory_transport`].
pub(crate) struct Peer {
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    fail: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    /// Send a frame to the server.
    pub(crate) fn send(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    /// Send a text frame to the server.
    pub(crate) fn send_text(&self, text: &str) {
        self.send(Frame::Text(text.to_string()));
    }

    /// Next frame the server wrote, or `None` once the sink is gone.
    pub(crate) async fn next_frame(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next text frame the server wrote, skipping pings.
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        loop {
            if let Frame::Text(text) = self.outbound.recv().await? {
                return Some(text);
            }
        }
    }

    /// Make every later write fail.
    pub(crate) fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Make every later write hang.
    pub(crate) fn stall_writes(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    /// Whether the server closed its sink.
    pub(crate) fn sink_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A connected sink/stream pair plus the peer that drives it.
pub(crate) fn memory_transport() -> (MemorySink, FrameStream, Peer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let fail = Arc::new(AtomicBool::new(false));
    let stall = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));

    let sink = MemorySink {
        outbound: out_tx,
        fail: Arc::clone(&fail),
        stall: Arc::clone(&stall),
        closed: Arc::clone(&closed),
    };
    let stream: FrameStream = Box::pin(futures::stream::unfold(in_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    let peer = Peer {
        inbound: in_tx,
        outbound: out_rx,
        fail,
        stall,
        closed,
    };
    (sink, stream, peer)
}
