//! Durable record of each run: append-only iterations plus one finalized result.
//!
//! Two backends share [`RunDocument`] for their invariants:
//! - [`MemoryStore`] keeps documents in process, for tests and embedding.
//! - [`FileStore`] writes one JSON document per run under a root directory.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use revisor_types::{FinalizedResult, IterationRecord, Result, RevisorError, RunHistory, RunId};

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Append one iteration. Idempotent per index: re-appending an existing
    /// index returns `Ok(false)` and leaves the stored record untouched.
    async fn append_iteration(&self, run_id: &RunId, record: &IterationRecord) -> Result<bool>;

    /// Full history of a run; empty for unknown runs.
    async fn read_history(&self, run_id: &RunId) -> Result<RunHistory>;

    /// Write the terminal result. A second call fails with `DuplicateFinalization`.
    async fn finalize(&self, run_id: &RunId, result: &FinalizedResult) -> Result<()>;

    /// The terminal result, or `NotFinalized`.
    async fn read_final(&self, run_id: &RunId) -> Result<FinalizedResult>;

    /// Every known run, sorted by id.
    async fn list_runs(&self) -> Result<Vec<RunId>>;
}

// ---------------------------------------------------------------------------
// RunDocument
// ---------------------------------------------------------------------------

/// Persisted form of a run: `{run_id, iterations, created_at, final}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDocument {
    #[serde(flatten)]
    pub history: RunHistory,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "final", default)]
    pub final_result: Option<FinalizedResult>,
}

impl RunDocument {
    pub fn new(run_id: RunId) -> Self {
        Self {
            history: RunHistory::new(run_id),
            created_at: Utc::now(),
            final_result: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        self.history.run_id()
    }

    pub fn append(&mut self, record: &IterationRecord) -> Result<bool> {
        if self.final_result.is_some() && self.history.get(record.iteration_index).is_none() {
            return Err(RevisorError::RunClosed {
                run_id: self.run_id().to_string(),
            });
        }
        self.history.append(record.clone())
    }

    pub fn finalize(&mut self, result: &FinalizedResult) -> Result<()> {
        if self.final_result.is_some() {
            return Err(RevisorError::DuplicateFinalization {
                run_id: self.run_id().to_string(),
            });
        }
        self.final_result = Some(result.clone());
        Ok(())
    }

    pub fn final_result(&self) -> Result<FinalizedResult> {
        self.final_result
            .clone()
            .ok_or_else(|| RevisorError::NotFinalized {
                run_id: self.run_id().to_string(),
            })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;
    use revisor_types::RunStatus;

    #[test]
    fn document_serializes_with_final_key() {
        let mut doc = RunDocument::new(RunId::from("r1"));
        doc.append(&record(0, 70)).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["run_id"], "r1");
        assert_eq!(json["iterations"].as_array().unwrap().len(), 1);
        assert!(json["final"].is_null());
        assert!(json.get("created_at").is_some());

        let back: RunDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back.history.len(), 1);
    }

    #[test]
    fn finalized_document_rejects_new_iterations() {
        let mut doc = RunDocument::new(RunId::from("r1"));
        doc.append(&record(0, 70)).unwrap();
        let result = FinalizedResult::new(RunStatus::Exhausted, doc.history.clone());
        doc.finalize(&result).unwrap();

        assert!(!doc.append(&record(0, 70)).unwrap());
        assert!(matches!(
            doc.append(&record(1, 70)),
            Err(RevisorError::RunClosed { .. })
        ));
        assert!(matches!(
            doc.finalize(&result),
            Err(RevisorError::DuplicateFinalization { .. })
        ));
    }
}
