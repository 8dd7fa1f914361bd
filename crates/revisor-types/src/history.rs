//! Run identity, iteration records, append-only history and the finalized result.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::Draft;
use crate::review::Review;
use crate::{Result, RevisorError};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Stable identifier of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// IterationRecord / RunHistory
// ---------------------------------------------------------------------------

/// Immutable (draft, review) pair tagged with its position in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration_index: u32,
    pub draft: Draft,
    pub review: Review,
    pub timestamp: DateTime<Utc>,
}

impl IterationRecord {
    pub fn new(iteration_index: u32, draft: Draft, review: Review) -> Self {
        Self {
            iteration_index,
            draft,
            review,
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only sequence of iteration records for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    run_id: RunId,
    iterations: Vec<IterationRecord>,
}

impl RunHistory {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            iterations: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Append `record` at the next index.
    ///
    /// Returns `Ok(false)` without changing anything when a record with the
    /// same index is already present, and `OutOfOrderAppend` when the index
    /// would leave a gap.
    pub fn append(&mut self, record: IterationRecord) -> Result<bool> {
        let expected = self.next_index();
        if record.iteration_index < expected {
            return Ok(false);
        }
        if record.iteration_index > expected {
            return Err(RevisorError::OutOfOrderAppend {
                run_id: self.run_id.to_string(),
                expected,
                got: record.iteration_index,
            });
        }
        self.iterations.push(record);
        Ok(true)
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.iterations
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.iterations.last()
    }

    pub fn get(&self, index: u32) -> Option<&IterationRecord> {
        self.iterations.get(index as usize)
    }

    /// Index the next appended record must carry.
    pub fn next_index(&self) -> u32 {
        self.iterations.len() as u32
    }

    /// Highest `overall_score`; ties go to the lowest index.
    pub fn best(&self) -> Option<&IterationRecord> {
        self.iterations.iter().fold(None, |best, record| match best {
            Some(b) if b.review.overall_score >= record.review.overall_score => Some(b),
            _ => Some(record),
        })
    }

    /// Indices form the sequence `0, 1, .., len - 1`.
    pub fn is_contiguous(&self) -> bool {
        self.iterations
            .iter()
            .enumerate()
            .all(|(i, r)| r.iteration_index as usize == i)
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Why a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Escalated,
    Exhausted,
    Faulted,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Escalated => "escalated",
            RunStatus::Exhausted => "exhausted",
            RunStatus::Faulted => "faulted",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FaultReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    Producer,
    Evaluator,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collaborator::Producer => "producer",
            Collaborator::Evaluator => "evaluator",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The collaborator fault that aborted a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub collaborator: Collaborator,
    pub iteration_index: u32,
    pub attempts: u32,
    pub message: String,
}

// ---------------------------------------------------------------------------
// FinalizedResult
// ---------------------------------------------------------------------------

/// Terminal artifact of a run. Written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedResult {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Draft the result is based on; absent when no iteration completed.
    pub draft: Option<Draft>,
    pub review: Option<Review>,
    pub basis_iteration: Option<u32>,
    /// Set when the basis is the best attempt rather than a passing one.
    pub best_effort: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultReport>,
    pub history: RunHistory,
    pub finalized_at: DateTime<Utc>,
}

impl FinalizedResult {
    /// A result with no basis draft.
    pub fn new(status: RunStatus, history: RunHistory) -> Self {
        Self {
            run_id: history.run_id().clone(),
            status,
            draft: None,
            review: None,
            basis_iteration: None,
            best_effort: false,
            reason: None,
            fault: None,
            history,
            finalized_at: Utc::now(),
        }
    }

    /// Base the result on the history record at `index`.
    pub fn with_basis(mut self, index: u32, best_effort: bool) -> Self {
        if let Some(record) = self.history.get(index) {
            self.draft = Some(record.draft.clone());
            self.review = Some(record.review.clone());
            self.basis_iteration = Some(index);
            self.best_effort = best_effort;
        }
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_fault(mut self, fault: FaultReport) -> Self {
        self.fault = Some(fault);
        self
    }
}
