//! Connection lifecycle.
//!
//! One connection runs as a main task plus a reader, a handshake task and,
//! once authenticated, a keepalive task:
//!
//! ```text
//! Connecting -> Authenticating -> Active -> Closed
//!                      \______________________/
//! ```
//!
//! The main task selects over three sources: the identity coming out of
//! the handshake, the reader's disconnect signal and the session's
//! outbound messages. Every exit, including a failed write, goes through
//! the same teardown, so the registry slot is always released.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use courier_core::{ConnectionId, Identity};
use futures::StreamExt;
use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::Payload;
use crate::handshake::run_handshake;
use crate::hub::Shared;
use crate::keepalive::{KeepaliveOutcome, PongTracker, run_keepalive};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::transport::{Deadlines, Frame, FrameSink, FrameStream, TransportError};
use crate::writer::GatedWriter;

/// Capacity of the reader to handshake text channel.
const INBOUND_TEXT_CAPACITY: usize = 16;

/// Connection state as observed through a [`ConnectionHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Tasks are being started.
    Connecting,
    /// Waiting for a greeting.
    Authenticating,
    /// Subscribed and relaying.
    Active,
    /// Torn down. Terminal.
    Closed,
}

/// Handle to a running connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Connection id, as it appears in log spans.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `state` (or any later state when
    /// the connection closes first).
    pub async fn wait_for(&mut self, state: ConnectionState) -> ConnectionState {
        match self
            .state
            .wait_for(|s| *s == state || *s == ConnectionState::Closed)
            .await
        {
            Ok(s) => *s,
            Err(_) => ConnectionState::Closed,
        }
    }

    /// Ask the connection to tear down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait for the connection task to finish.
    pub async fn join(self) {
        if let Err(error) = self.task.await {
            error!(connection_id = %self.id, %error, "connection task failed");
        }
    }
}

/// Why the reader stopped.
#[derive(Debug)]
enum ReadEnd {
    Closed,
    DeadlineExpired,
    Error(TransportError),
}

/// Why the main loop ended.
#[derive(Debug)]
enum Exit {
    Disconnected(ReadEnd),
    WriteFailed(TransportError),
    SlotClosed,
    Shutdown,
}

/// The subscribed half of an active connection.
struct Session {
    identity: Identity,
    index: usize,
    receiver: mpsc::Receiver<Payload>,
    backlog: VecDeque<Payload>,
}

impl Session {
    /// Cached messages first, then the delivery channel.
    async fn next(&mut self) -> Option<Payload> {
        if let Some(payload) = self.backlog.pop_front() {
            return Some(payload);
        }
        self.receiver.recv().await
    }
}

async fn next_outbound(session: Option<&mut Session>) -> Option<Payload> {
    match session {
        Some(session) => session.next().await,
        None => std::future::pending().await,
    }
}

/// Start a connection on an upgraded transport.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    sink: Box<dyn FrameSink>,
    stream: FrameStream,
    peer: String,
) -> ConnectionHandle {
    let id = ConnectionId::new();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let cancel = shared.shutdown.child_token();
    // Counted before the task runs so `RelayHub::wait_idle` never misses it.
    let _ = shared.open_connections.fetch_add(1, Ordering::AcqRel);
    let task = tokio::spawn(run_connection(
        shared,
        id.clone(),
        peer,
        sink,
        stream,
        state_tx,
        cancel.clone(),
    ));
    ConnectionHandle {
        id,
        state: state_rx,
        cancel,
        task,
    }
}

#[instrument(skip_all, fields(connection_id = %id, peer = %peer, identity = tracing::field::Empty))]
async fn run_connection(
    shared: Arc<Shared>,
    id: ConnectionId,
    peer: String,
    sink: Box<dyn FrameSink>,
    stream: FrameStream,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let deadlines = Arc::new(Deadlines::new(shared.config.timeout));
    let writer = Arc::new(GatedWriter::new(
        sink,
        shared.gate.clone(),
        Arc::clone(&deadlines),
    ));
    let pongs = Arc::new(PongTracker::new());

    let (text_tx, text_rx) = mpsc::channel(INBOUND_TEXT_CAPACITY);
    let (disconnect_tx, mut disconnect_rx) = oneshot::channel();
    let reader = tokio::spawn(
        read_frames(stream, Arc::clone(&deadlines), Arc::clone(&pongs), text_tx, disconnect_tx)
            .in_current_span(),
    );

    let handshake_cancel = cancel.child_token();
    let keepalive_cancel = cancel.child_token();
    let (identity_tx, mut identity_rx) = oneshot::channel();
    let handshake =
        tokio::spawn(run_handshake(text_rx, identity_tx, handshake_cancel.clone()).in_current_span());
    let _ = state.send_replace(ConnectionState::Authenticating);

    let mut session: Option<Session> = None;
    let mut awaiting_identity = true;
    let mut keepalive: Option<JoinHandle<KeepaliveOutcome>> = None;

    let exit = loop {
        tokio::select! {
            () = cancel.cancelled() => break Exit::Shutdown,

            end = &mut disconnect_rx => {
                break Exit::Disconnected(end.unwrap_or(ReadEnd::Closed));
            }

            identity = &mut identity_rx, if awaiting_identity => {
                awaiting_identity = false;
                let Ok(identity) = identity else { continue };
                let _ = tracing::Span::current().record("identity", identity.as_str());

                let attached = attach(&shared, identity).await;
                info!(index = attached.index, cached = attached.backlog.len(), "client subscribed");
                session = Some(attached);

                keepalive = Some(tokio::spawn(
                    run_keepalive(Arc::clone(&writer), Arc::clone(&pongs), keepalive_cancel.clone())
                        .in_current_span(),
                ));
                let _ = state.send_replace(ConnectionState::Active);
            }

            payload = next_outbound(session.as_mut()) => {
                let Some(payload) = payload else { break Exit::SlotClosed };
                debug!(len = payload.len(), "relaying message");
                if let Err(error) = writer.write(Frame::Text(payload.to_string())).await {
                    break Exit::WriteFailed(error);
                }
            }
        }
    };

    match &exit {
        Exit::Disconnected(end) => info!(?end, "client disconnected"),
        Exit::WriteFailed(error) => error!(%error, "unable to write message"),
        Exit::SlotClosed => warn!("session slot closed by registry"),
        Exit::Shutdown => info!("connection closed by server"),
    }

    // Closing the channel first releases any publisher blocked on it.
    if let Some(session) = session.as_mut() {
        session.receiver.close();
    }

    {
        let _pass = shared.gate.enter().await;
        handshake_cancel.cancel();
        keepalive_cancel.cancel();
        if let Some(session) = &session {
            let action = shared
                .registry
                .lock()
                .disconnect(&session.identity, session.index);
            debug!(index = session.index, ?action, "disconnect policy applied");
        }
    }

    handshake.abort();
    if let Some(keepalive) = keepalive {
        keepalive.abort();
    }
    if let Err(error) = writer.close().await {
        debug!(%error, "unable to close transport");
    }
    reader.abort();

    if shared.open_connections.fetch_sub(1, Ordering::AcqRel) == 1 {
        shared.idle.notify_waiters();
    }
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    let _ = state.send_replace(ConnectionState::Closed);
    info!("connection closed");
}

/// Subscribe and take the identity's cached messages in one step, so no
/// publish can land between them.
async fn attach(shared: &Shared, identity: Identity) -> Session {
    let _pass = shared.gate.enter().await;
    let mut registry = shared.registry.lock();
    let subscription = registry.subscribe(&identity);
    let backlog = shared
        .cache
        .pop(&identity)
        .into_iter()
        .map(|message| message.payload)
        .collect();
    drop(registry);

    Session {
        identity,
        index: subscription.index,
        receiver: subscription.receiver,
        backlog,
    }
}

/// Read frames until close, error or read-deadline expiry.
async fn read_frames(
    mut stream: FrameStream,
    deadlines: Arc<Deadlines>,
    pongs: Arc<PongTracker>,
    text_tx: mpsc::Sender<String>,
    disconnect_tx: oneshot::Sender<ReadEnd>,
) {
    let end = loop {
        let deadline = deadlines.read_deadline();
        let frame = tokio::select! {
            frame = stream.next() => frame,
            () = tokio::time::sleep_until(deadline) => {
                if deadlines.read_deadline() > deadline {
                    continue;
                }
                break ReadEnd::DeadlineExpired;
            }
        };

        match frame {
            None | Some(Ok(Frame::Close)) => {
                debug!("close frame, client will be disconnected");
                break ReadEnd::Closed;
            }
            Some(Err(error)) => break ReadEnd::Error(error),
            Some(Ok(Frame::Pong(_))) => {
                debug!("pong received");
                pongs.record();
            }
            Some(Ok(Frame::Ping(_))) => debug!("ping received, ignoring"),
            Some(Ok(Frame::Text(text))) => {
                if text_tx.send(text).await.is_err() {
                    debug!("handshake gone, dropping text frame");
                }
            }
            Some(Ok(Frame::Binary(data))) => {
                error!(len = data.len(), "unexpected binary frame");
            }
        }
    };
    let _ = disconnect_tx.send(end);
}
