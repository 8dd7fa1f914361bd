use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use revisor_types::{FinalizedResult, IterationRecord, Result, RevisorError, RunHistory, RunId};

use super::{RunDocument, RunStore};

/// In-process store. Each run has its own lock so runs never contend.
#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<BTreeMap<RunId, Arc<Mutex<RunDocument>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn document(&self, run_id: &RunId) -> Arc<Mutex<RunDocument>> {
        if let Some(doc) = self.runs.read().await.get(run_id) {
            return doc.clone();
        }
        self.runs
            .write()
            .await
            .entry(run_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RunDocument::new(run_id.clone()))))
            .clone()
    }

    async fn existing(&self, run_id: &RunId) -> Option<Arc<Mutex<RunDocument>>> {
        self.runs.read().await.get(run_id).cloned()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn append_iteration(&self, run_id: &RunId, record: &IterationRecord) -> Result<bool> {
        let doc = self.document(run_id).await;
        let mut doc = doc.lock().await;
        doc.append(record)
    }

    async fn read_history(&self, run_id: &RunId) -> Result<RunHistory> {
        match self.existing(run_id).await {
            Some(doc) => Ok(doc.lock().await.history.clone()),
            None => Ok(RunHistory::new(run_id.clone())),
        }
    }

    async fn finalize(&self, run_id: &RunId, result: &FinalizedResult) -> Result<()> {
        let doc = self.document(run_id).await;
        let mut doc = doc.lock().await;
        doc.finalize(result)
    }

    async fn read_final(&self, run_id: &RunId) -> Result<FinalizedResult> {
        match self.existing(run_id).await {
            Some(doc) => doc.lock().await.final_result(),
            None => Err(RevisorError::NotFinalized {
                run_id: run_id.to_string(),
            }),
        }
    }

    async fn list_runs(&self) -> Result<Vec<RunId>> {
        Ok(self.runs.read().await.keys().cloned().collect())
    }
}
