//! Run event system for observability.
//!
//! Emits [`RunEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (loggers, dashboards, tests) can follow a run without coupling to
//! the orchestrator internals.

use serde::{Deserialize, Serialize};

use revisor_types::{Collaborator, RunStatus};

use crate::state::RunState;

/// Events emitted while a run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        topic: String,
        max_iterations: u32,
    },
    StateChanged {
        run_id: String,
        from: RunState,
        to: RunState,
        iteration: u32,
    },
    IterationRecorded {
        run_id: String,
        iteration_index: u32,
        overall_score: u32,
        passed: bool,
    },
    CallRetrying {
        run_id: String,
        collaborator: Collaborator,
        iteration: u32,
        attempt: u32,
        error: String,
    },
    RunFinalized {
        run_id: String,
        status: RunStatus,
        iterations: usize,
        duration_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
