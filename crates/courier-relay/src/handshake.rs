//! `HELLO <identity>` greeting.
//!
//! The first well-formed greeting authenticates the connection. Anything
//! after that, including further greetings, is read and discarded until
//! the task is cancelled.

use courier_core::Identity;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Greeting keyword.
pub const GREETING: &str = "HELLO";

/// Why a greeting was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The connection already has an identity.
    AlreadyAuthenticated,
    /// The greeting did not have exactly two tokens.
    Malformed,
}

/// Result of feeding one text frame to the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// Greeting accepted.
    Authenticated(Identity),
    /// Greeting refused.
    Rejected(Rejection),
    /// Not a greeting.
    Ignored,
}

/// Greeting state for one connection.
#[derive(Debug, Default)]
pub struct Handshake {
    authenticated: bool,
}

impl Handshake {
    /// Fresh, unauthenticated handshake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a greeting has been accepted.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Process one inbound text frame.
    pub fn on_text(&mut self, text: &str) -> HandshakeEvent {
        if !text.starts_with(GREETING) {
            return HandshakeEvent::Ignored;
        }
        if self.authenticated {
            return HandshakeEvent::Rejected(Rejection::AlreadyAuthenticated);
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() != 2 {
            return HandshakeEvent::Rejected(Rejection::Malformed);
        }
        self.authenticated = true;
        HandshakeEvent::Authenticated(Identity::from(tokens[1].trim()))
    }
}

/// Consume inbound text until cancelled, emitting the identity once.
pub async fn run_handshake(
    mut inbound: mpsc::Receiver<String>,
    identity_tx: oneshot::Sender<Identity>,
    cancel: CancellationToken,
) {
    let mut handshake = Handshake::new();
    let mut identity_tx = Some(identity_tx);

    loop {
        let text = tokio::select! {
            () = cancel.cancelled() => {
                debug!("handshake terminated");
                return;
            }
            text = inbound.recv() => match text {
                Some(text) => text,
                None => return,
            },
        };

        debug!(text = %text, "message from client");
        match handshake.on_text(&text) {
            HandshakeEvent::Authenticated(identity) => {
                debug!(%identity, "client authenticated");
                if let Some(tx) = identity_tx.take() {
                    let _ = tx.send(identity);
                }
            }
            HandshakeEvent::Rejected(Rejection::AlreadyAuthenticated) => {
                error!("session already authenticated");
            }
            HandshakeEvent::Rejected(Rejection::Malformed) => {
                error!(text = %text, "unexpected HELLO message");
            }
            HandshakeEvent::Ignored => {}
        }
    }
}
