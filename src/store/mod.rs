//! Hierarchical document storage: `collection/doc/collection/doc/...` paths
//! holding JSON objects, with partial updates, merges, server-assigned
//! timestamps and size-capped write batches.

pub mod file;
pub mod memory;

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;

pub type Document = Map<String, Value>;

/// Maximum number of writes accepted by a single [`WriteBatch`] commit.
pub const MAX_BATCH_WRITES: usize = 400;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(DocPath),
    #[error("invalid document path: {0}")]
    InvalidPath(String),
    #[error("store unavailable for {path}: {reason}")]
    Unavailable { path: DocPath, reason: String },
    #[error("batch of {0} writes exceeds the limit of {limit}", limit = MAX_BATCH_WRITES)]
    BatchTooLarge(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Path of a document. Always has an even number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    pub fn doc(collection: &str, id: &str) -> Self {
        Self {
            segments: vec![collection.to_string(), id.to_string()],
        }
    }

    pub fn child(&self, collection: &str, id: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(collection.to_string());
        segments.push(id.to_string());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments: Vec<String> = raw.split('/').map(str::to_string).collect();
        if segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        let invalid = self.segments.is_empty()
            || self.segments.len() % 2 != 0
            || self
                .segments
                .iter()
                .any(|s| s.is_empty() || s == "." || s == ".." || s.contains('/') || s.contains('\\'));
        if invalid {
            return Err(StoreError::InvalidPath(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// `users/{uid}/plans/{date}`
pub fn plan_path(user_id: &str, date_key: &str) -> DocPath {
    DocPath::doc("users", user_id).child("plans", date_key)
}

/// `users/{uid}/weekly_plans/{week}`
pub fn weekly_plan_path(user_id: &str, week_id: &str) -> DocPath {
    DocPath::doc("users", user_id).child("weekly_plans", week_id)
}

/// Field values plus names of fields the store stamps with its own clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentWrite {
    pub fields: Document,
    pub server_timestamps: Vec<String>,
}

impl DocumentWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn server_timestamp(mut self, name: &str) -> Self {
        self.server_timestamps.push(name.to_string());
        self
    }

    /// Every field name this write touches.
    pub fn keys(&self) -> Vec<String> {
        self.fields
            .keys()
            .cloned()
            .chain(self.server_timestamps.iter().cloned())
            .collect()
    }

    fn resolve(self, now: &str) -> Document {
        let mut fields = self.fields;
        for name in self.server_timestamps {
            fields.insert(name, Value::String(now.to_string()));
        }
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Replace the whole document.
    Set,
    /// Deep-merge into the document, creating it if needed.
    Merge,
    /// Replace top-level fields of an existing document.
    Update,
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<(DocPath, WriteOp, DocumentWrite)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, write: DocumentWrite) {
        self.writes.push((path, WriteOp::Set, write));
    }

    pub fn merge(&mut self, path: DocPath, write: DocumentWrite) {
        self.writes.push((path, WriteOp::Merge, write));
    }

    pub fn update(&mut self, path: DocPath, write: DocumentWrite) {
        self.writes.push((path, WriteOp::Update, write));
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<(DocPath, WriteOp, DocumentWrite)> {
        self.writes
    }
}

pub(crate) fn server_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn deep_merge(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Applies one write to the current state of a document and returns the new state.
pub(crate) fn apply_write(
    path: &DocPath,
    existing: Option<Document>,
    op: WriteOp,
    write: DocumentWrite,
    now: &str,
) -> Result<Document, StoreError> {
    let fields = write.resolve(now);
    match op {
        WriteOp::Set => Ok(fields),
        WriteOp::Merge => {
            let mut document = existing.unwrap_or_default();
            deep_merge(&mut document, fields);
            Ok(document)
        }
        WriteOp::Update => {
            let mut document = existing.ok_or_else(|| StoreError::NotFound(path.clone()))?;
            document.extend(fields);
            Ok(document)
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    async fn write(&self, path: &DocPath, op: WriteOp, write: DocumentWrite) -> Result<(), StoreError>;

    async fn set(&self, path: &DocPath, write: DocumentWrite) -> Result<(), StoreError> {
        self.write(path, WriteOp::Set, write).await
    }

    async fn set_merge(&self, path: &DocPath, write: DocumentWrite) -> Result<(), StoreError> {
        self.write(path, WriteOp::Merge, write).await
    }

    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, path: &DocPath, write: DocumentWrite) -> Result<(), StoreError> {
        self.write(path, WriteOp::Update, write).await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge(batch.len()));
        }
        for (path, op, write) in batch.into_writes() {
            self.write(&path, op, write).await?;
        }
        Ok(())
    }
}
