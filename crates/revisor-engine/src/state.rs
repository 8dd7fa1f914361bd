//! Run states, the legal transition table, and the machine that enforces it.

use std::fmt;

use serde::{Deserialize, Serialize};

use revisor_types::{IterationRecord, Result, RevisorError, RunHistory, RunStatus};

/// Position of a run in the draft-evaluate-revise loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Generating,
    Evaluating,
    Revising,
    Passed,
    Escalated,
    Exhausted,
    Faulted,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::Generating => "generating",
            RunState::Evaluating => "evaluating",
            RunState::Revising => "revising",
            RunState::Passed => "passed",
            RunState::Escalated => "escalated",
            RunState::Exhausted => "exhausted",
            RunState::Faulted => "faulted",
            RunState::Cancelled => "cancelled",
        }
    }

    /// The status a terminal state finalizes with; `None` for active states.
    pub fn terminal_status(&self) -> Option<RunStatus> {
        match self {
            RunState::Passed => Some(RunStatus::Passed),
            RunState::Escalated => Some(RunStatus::Escalated),
            RunState::Exhausted => Some(RunStatus::Exhausted),
            RunState::Faulted => Some(RunStatus::Faulted),
            RunState::Cancelled => Some(RunStatus::Cancelled),
            RunState::Init | RunState::Generating | RunState::Evaluating | RunState::Revising => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_status().is_some()
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Generating)
                | (Init, Escalated)
                | (Init, Cancelled)
                | (Generating, Evaluating)
                | (Generating, Faulted)
                | (Evaluating, Passed)
                | (Evaluating, Revising)
                | (Evaluating, Escalated)
                | (Evaluating, Exhausted)
                | (Evaluating, Faulted)
                | (Evaluating, Cancelled)
                | (Revising, Generating)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunMachine
// ---------------------------------------------------------------------------

/// Current state plus the history accumulated so far.
///
/// Every state change goes through [`RunMachine::transition`]; once a terminal
/// state is entered the machine accepts no further transitions or records.
#[derive(Debug)]
pub struct RunMachine {
    state: RunState,
    history: RunHistory,
}

impl RunMachine {
    /// A fresh run with no iterations.
    pub fn new(history: RunHistory) -> Self {
        Self {
            state: RunState::Init,
            history,
        }
    }

    /// Pick up a run whose persisted history already holds evaluated
    /// iterations. An empty history starts from `Init`.
    pub fn resumed(history: RunHistory) -> Self {
        let state = if history.is_empty() {
            RunState::Init
        } else {
            RunState::Evaluating
        };
        Self { state, history }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn into_history(self) -> RunHistory {
        self.history
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&mut self, next: RunState) -> Result<RunState> {
        if !self.state.can_transition_to(next) {
            return Err(RevisorError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        let prev = self.state;
        self.state = next;
        Ok(prev)
    }

    /// Append an evaluated iteration. Only legal while evaluating.
    pub fn record(&mut self, record: IterationRecord) -> Result<bool> {
        if self.state != RunState::Evaluating {
            return Err(RevisorError::IllegalTransition {
                from: self.state.to_string(),
                to: "record".to_string(),
            });
        }
        self.history.append(record)
    }
}
