//! Serialized, deadline-bounded writes to one connection.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::gate::Gate;
use crate::transport::{Deadlines, Frame, FrameSink, TransportError};

/// Write half of a connection behind the gate and the write deadline.
///
/// Every write enters the gate first and then takes the sink lock, so in
/// scoped mode writes to one connection are serialized by the sink lock
/// alone and in global mode by the process-wide permit as well.
pub struct GatedWriter {
    gate: Gate,
    sink: Mutex<Box<dyn FrameSink>>,
    deadlines: Arc<Deadlines>,
}

impl GatedWriter {
    /// Wrap `sink`.
    pub fn new(sink: Box<dyn FrameSink>, gate: Gate, deadlines: Arc<Deadlines>) -> Self {
        Self {
            gate,
            sink: Mutex::new(sink),
            deadlines,
        }
    }

    /// Deadlines this writer honours.
    pub fn deadlines(&self) -> &Arc<Deadlines> {
        &self.deadlines
    }

    /// Write one frame, failing with [`TransportError::Timeout`] if the
    /// write deadline passes first.
    pub async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        let _pass = self.gate.enter().await;
        let mut sink = self.sink.lock().await;
        tokio::time::timeout_at(self.deadlines.write_deadline(), sink.send_frame(frame))
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }

    /// Close the transport. Bounded by the write deadline like any write.
    pub async fn close(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        tokio::time::timeout_at(self.deadlines.write_deadline(), sink.close())
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }
}

impl std::fmt::Debug for GatedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedWriter")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
