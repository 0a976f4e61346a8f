//! Adapter between axum's WebSocket and the relay's transport traits.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use courier_relay::{Frame, FrameSink, FrameStream, TransportError};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

/// Write half of an upgraded axum WebSocket.
pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.0.send(to_message(frame)).await.map_err(transport_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(transport_error)
    }
}

/// Split a socket into the relay's sink and stream halves.
pub fn split(socket: WebSocket) -> (WsSink, FrameStream) {
    let (tx, rx) = socket.split();
    let stream = rx
        .map(|msg| msg.map(to_frame).map_err(transport_error))
        .boxed();
    (WsSink(tx), stream)
}

/// Relay frame to WebSocket message.
pub fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close => Message::Close(None),
    }
}

/// WebSocket message to relay frame.
pub fn to_frame(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text.to_string()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(_) => Frame::Close,
    }
}

fn transport_error(error: axum::Error) -> TransportError {
    TransportError::Io(error.to_string())
}
