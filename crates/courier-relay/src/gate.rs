//! Serialization gate.
//!
//! In [`GateMode::Global`] one process-wide permit is taken around registry
//! mutation, publish fan-out and every transport write, so at most one of
//! those runs at a time. In [`GateMode::Scoped`] entering the gate is free:
//! the registry lock and each connection's sink lock provide the exclusion
//! instead.

use std::sync::Arc;

use courier_settings::GateMode;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-wide gate. Clones share the same permit.
#[derive(Clone, Debug)]
pub struct Gate {
    mode: GateMode,
    permit: Arc<Mutex<()>>,
}

/// Proof of having entered the gate. Leaving is dropping it.
#[derive(Debug)]
#[must_use = "the gate is left as soon as the pass is dropped"]
pub struct GatePass {
    _guard: Option<OwnedMutexGuard<()>>,
}

impl Gate {
    /// Create a gate in the given mode.
    pub fn new(mode: GateMode) -> Self {
        Self {
            mode,
            permit: Arc::new(Mutex::new(())),
        }
    }

    /// Gate mode.
    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Enter the gate. Waits without a timeout in global mode.
    pub async fn enter(&self) -> GatePass {
        let guard = match self.mode {
            GateMode::Global => Some(Arc::clone(&self.permit).lock_owned().await),
            GateMode::Scoped => None,
        };
        GatePass { _guard: guard }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new(GateMode::default())
    }
}
