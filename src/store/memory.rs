use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use super::{apply_write, server_now, DocPath, Document, DocumentStore, DocumentWrite, StoreError, WriteBatch, WriteOp, MAX_BATCH_WRITES};

/// One applied write, kept so callers can inspect the order of mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub path: DocPath,
    pub op: WriteOp,
    pub keys: Vec<String>,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<DocPath, Document>,
    log: Vec<WriteRecord>,
    unavailable: HashSet<DocPath>,
}

/// In-process store. Batches are applied atomically under one lock.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: RwLock<State>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document without recording a write.
    pub async fn insert(&self, path: DocPath, document: Document) {
        self.state.write().await.documents.insert(path, document);
    }

    pub async fn snapshot(&self, path: &DocPath) -> Option<Document> {
        self.state.read().await.documents.get(path).cloned()
    }

    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.state.read().await.log.clone()
    }

    pub async fn writes_to(&self, path: &DocPath) -> Vec<WriteRecord> {
        self.state
            .read()
            .await
            .log
            .iter()
            .filter(|record| &record.path == path)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Makes every access to `path` fail until cleared.
    pub async fn make_unavailable(&self, path: DocPath) {
        self.state.write().await.unavailable.insert(path);
    }

    fn check_available(state: &State, path: &DocPath) -> Result<(), StoreError> {
        if state.unavailable.contains(path) {
            return Err(StoreError::Unavailable {
                path: path.clone(),
                reason: "simulated outage".to_string(),
            });
        }
        Ok(())
    }

    fn apply(state: &mut State, path: &DocPath, op: WriteOp, write: DocumentWrite, now: &str) -> Result<(), StoreError> {
        path.validate()?;
        Self::check_available(state, path)?;
        let keys = write.keys();
        let existing = state.documents.get(path).cloned();
        let document = apply_write(path, existing, op, write, now)?;
        state.documents.insert(path.clone(), document);
        state.log.push(WriteRecord {
            path: path.clone(),
            op,
            keys,
        });
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        path.validate()?;
        let state = self.state.read().await;
        Self::check_available(&state, path)?;
        Ok(state.documents.get(path).cloned())
    }

    async fn write(&self, path: &DocPath, op: WriteOp, write: DocumentWrite) -> Result<(), StoreError> {
        let now = server_now();
        let mut state = self.state.write().await;
        Self::apply(&mut state, path, op, write, &now)
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge(batch.len()));
        }
        let now = server_now();
        let mut state = self.state.write().await;
        let mut staged = State {
            documents: state.documents.clone(),
            log: Vec::new(),
            unavailable: state.unavailable.clone(),
        };
        for (path, op, write) in batch.into_writes() {
            Self::apply(&mut staged, &path, op, write, &now)?;
        }
        state.documents = staged.documents;
        state.log.extend(staged.log);
        Ok(())
    }
}
