use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;

use revisor_types::{FinalizedResult, IterationRecord, Result, RevisorError, RunHistory, RunId};

use super::{RunDocument, RunStore};

/// One pretty-printed JSON document per run at `<root>/<run_id>.json`.
///
/// Writes go to a sibling temp file and are renamed into place, so a reader
/// never sees a half-written document. Each run is serialized behind its own
/// lock; a lock lives only while some call holds it.
pub struct FileStore {
    root: PathBuf,
    locks: Mutex<HashMap<RunId, Weak<Mutex<()>>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, run_id: &RunId) -> Result<PathBuf> {
        let id = run_id.as_str();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RevisorError::Other(format!(
                "Run id '{id}' cannot be used as a file name"
            )));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    async fn lock_for(&self, run_id: &RunId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(run_id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(run_id.clone(), Arc::downgrade(&lock));
        lock
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<RunDocument>> {
        let path = self.document_path(run_id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    async fn save(&self, doc: &RunDocument) -> Result<()> {
        let path = self.document_path(doc.run_id())?;
        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), iterations = doc.history.len(), "Run document saved");
        Ok(())
    }

    async fn load_or_new(&self, run_id: &RunId) -> Result<RunDocument> {
        Ok(self
            .load(run_id)
            .await?
            .unwrap_or_else(|| RunDocument::new(run_id.clone())))
    }
}

#[async_trait]
impl RunStore for FileStore {
    async fn append_iteration(&self, run_id: &RunId, record: &IterationRecord) -> Result<bool> {
        let lock = self.lock_for(run_id).await;
        let _guard = lock.lock().await;
        let mut doc = self.load_or_new(run_id).await?;
        let appended = doc.append(record)?;
        if appended {
            self.save(&doc).await?;
        }
        Ok(appended)
    }

    async fn read_history(&self, run_id: &RunId) -> Result<RunHistory> {
        let lock = self.lock_for(run_id).await;
        let _guard = lock.lock().await;
        Ok(self
            .load(run_id)
            .await?
            .map(|doc| doc.history)
            .unwrap_or_else(|| RunHistory::new(run_id.clone())))
    }

    async fn finalize(&self, run_id: &RunId, result: &FinalizedResult) -> Result<()> {
        let lock = self.lock_for(run_id).await;
        let _guard = lock.lock().await;
        let mut doc = self.load_or_new(run_id).await?;
        doc.finalize(result)?;
        self.save(&doc).await
    }

    async fn read_final(&self, run_id: &RunId) -> Result<FinalizedResult> {
        let lock = self.lock_for(run_id).await;
        let _guard = lock.lock().await;
        match self.load(run_id).await? {
            Some(doc) => doc.final_result(),
            None => Err(RevisorError::NotFinalized {
                run_id: run_id.to_string(),
            }),
        }
    }

    async fn list_runs(&self) -> Result<Vec<RunId>> {
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                runs.push(RunId::from(stem));
            }
        }
        runs.sort();
        Ok(runs)
    }
}
