use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::{apply_write, server_now, DocPath, Document, DocumentStore, DocumentWrite, StoreError, WriteOp};

/// Stores each document as `<root>/<collection>/<id>/.../<id>.json`.
///
/// Writes are serialized through one lock; concurrent writers to the same
/// document from other processes are not coordinated.
pub struct FileDocumentStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, path: &DocPath) -> Result<PathBuf, StoreError> {
        path.validate()?;
        let segments = path.segments();
        let mut file = self.root.clone();
        for segment in &segments[..segments.len() - 1] {
            file.push(segment);
        }
        file.push(format!("{}.json", path.id()));
        Ok(file)
    }

    async fn read(&self, file: &Path) -> Result<Option<Document>, StoreError> {
        match fs::read_to_string(file).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let file = self.file_for(path)?;
        self.read(&file).await
    }

    async fn write(&self, path: &DocPath, op: WriteOp, write: DocumentWrite) -> Result<(), StoreError> {
        let file = self.file_for(path)?;
        let _guard = self.write_lock.lock().await;
        let existing = self.read(&file).await?;
        let document = apply_write(path, existing, op, write, &server_now())?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&document)?).await?;
        fs::rename(&tmp, &file).await?;
        tracing::trace!(path = %path, "document written");
        Ok(())
    }
}
