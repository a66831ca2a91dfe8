//! Document and review-record storage.
//!
//! Documents are immutable once stored; `put` never overwrites an existing ID.
//! Review records are keyed by the analysed document's ID and replaced on
//! every analysis pass. A redline and the review record that points at it are
//! committed together through [`DocumentStore::commit_review`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ndareview_core::{Document, DocumentId, ReviewError, ReviewRecord};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::StoreError;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    async fn put(&self, document: Document) -> Result<DocumentId, StoreError>;

    /// IDs of all stored documents, sorted.
    async fn list(&self) -> Result<Vec<DocumentId>, StoreError>;

    /// Document rendered as downloadable text.
    async fn raw_bytes(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let document = self.get(id).await?;
        Ok(document.render_text().into_bytes())
    }

    async fn put_review(&self, record: ReviewRecord) -> Result<(), StoreError>;

    /// Latest review record for a document, if it was ever analysed.
    async fn get_review(&self, document_id: &str) -> Result<Option<ReviewRecord>, StoreError>;

    /// Delete a document. Only used to undo a partially applied commit.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Store a redline and its review record, or neither.
    async fn commit_review(
        &self,
        redline: Document,
        record: ReviewRecord,
    ) -> Result<DocumentId, StoreError> {
        let redline_id = self.put(redline).await?;
        if let Err(e) = self.put_review(record).await {
            if let Err(undo) = self.remove(&redline_id).await {
                warn!(redline_id = %redline_id, error = %undo, "orphaned redline left behind");
            }
            return Err(e);
        }
        Ok(redline_id)
    }
}

/// In-process store for tests and single-run pipelines.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, Document>>,
    reviews: RwLock<HashMap<DocumentId, ReviewRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }

    async fn put(&self, document: Document) -> Result<DocumentId, StoreError> {
        let id = document.id.clone();
        let mut documents = self.documents.write().await;
        if documents.contains_key(&id) {
            return Err(StoreError::Other(format!("document {id} already stored")));
        }
        documents.insert(id.clone(), document);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<DocumentId>, StoreError> {
        let mut ids: Vec<DocumentId> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn put_review(&self, record: ReviewRecord) -> Result<(), StoreError> {
        self.reviews
            .write()
            .await
            .insert(record.document_id.clone(), record);
        Ok(())
    }

    async fn get_review(&self, document_id: &str) -> Result<Option<ReviewRecord>, StoreError> {
        Ok(self.reviews.read().await.get(document_id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }
}

/// JSON files under a root directory: `documents/<id>.json`, `reviews/<id>.json`.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Open a store rooted at `root`, creating its directories if needed.
    pub async fn open(root: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(root.join("documents")).await?;
        tokio::fs::create_dir_all(root.join("reviews")).await?;
        info!(root = %root.display(), "opened document store");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn document_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("documents").join(format!("{}.json", checked_id(id)?)))
    }

    fn review_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("reviews").join(format!("{}.json", checked_id(id)?)))
    }
}

/// IDs become file names; anything but ASCII alphanumerics and '-' is unknown.
fn checked_id(id: &str) -> Result<&str, StoreError> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(StoreError::NotFound(format!("document {id}")));
    }
    Ok(id)
}

/// Write through a temporary file so readers never see a partial document.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let path = self.document_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("document {id}")));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn put(&self, document: Document) -> Result<DocumentId, StoreError> {
        let path = self.document_path(&document.id)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::Other(format!(
                "document {} already stored",
                document.id
            )));
        }
        let bytes = serde_json::to_vec_pretty(&document)?;
        write_atomic(&path, &bytes).await?;
        debug!(id = %document.id, paragraphs = document.len(), "stored document");
        Ok(document.id)
    }

    async fn list(&self) -> Result<Vec<DocumentId>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join("documents")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn put_review(&self, record: ReviewRecord) -> Result<(), StoreError> {
        let path = self.review_path(&record.document_id)?;
        let bytes = serde_json::to_vec_pretty(&record)?;
        write_atomic(&path, &bytes).await
    }

    async fn get_review(&self, document_id: &str) -> Result<Option<ReviewRecord>, StoreError> {
        let path = self.review_path(document_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.document_path(id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("document {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a document file from disk (JSON document body or plain text).
pub async fn read_document_file(path: &Path) -> ndareview_core::Result<Document> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReviewError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Document::parse(&bytes).map_err(|e| match e {
        ReviewError::MalformedDocument(reason) => {
            ReviewError::MalformedDocument(format!("{}: {reason}", path.display()))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndareview_core::{Findings, Paragraph, Suggestions};

    fn record(document_id: &str) -> ReviewRecord {
        ReviewRecord {
            document_id: document_id.to_string(),
            redline_id: "redline".to_string(),
            findings: Findings::new(),
            suggestions: Suggestions::new(),
        }
    }

    #[tokio::test]
    async fn memory_put_get() {
        let store = MemoryDocumentStore::new();
        let doc = Document::from_text("A\nB");
        let id = store.put(doc.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), doc);
        assert_eq!(store.list().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn memory_unknown_id_not_found() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn memory_documents_are_immutable() {
        let store = MemoryDocumentStore::new();
        let doc = Document::from_text("A");
        store.put(doc.clone()).await.unwrap();
        assert!(store.put(doc).await.is_err());
    }

    #[tokio::test]
    async fn raw_bytes_renders_markup() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new(vec![Paragraph::removed("B", 0), Paragraph::proposed("X", 0)]);
        let id = store.put(doc).await.unwrap();
        assert_eq!(store.raw_bytes(&id).await.unwrap(), b"[-B-]\n{+X+}".to_vec());
    }

    #[tokio::test]
    async fn memory_review_replaced() {
        let store = MemoryDocumentStore::new();
        assert!(store.get_review("doc").await.unwrap().is_none());

        store.put_review(record("doc")).await.unwrap();
        let mut second = record("doc");
        second.redline_id = "redline-2".into();
        store.put_review(second).await.unwrap();

        let stored = store.get_review("doc").await.unwrap().unwrap();
        assert_eq!(stored.redline_id, "redline-2");
    }

    #[tokio::test]
    async fn commit_review_stores_both() {
        let store = MemoryDocumentStore::new();
        let redline = Document::from_text("A");
        let mut rec = record("doc");
        rec.redline_id = redline.id.clone();

        let id = store.commit_review(redline, rec).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![id.clone()]);
        assert_eq!(store.get_review("doc").await.unwrap().unwrap().redline_id, id);
    }

    #[tokio::test]
    async fn fs_commit_review_rejects_bad_record_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsDocumentStore::open(tmp.path()).await.unwrap();

        // The record's document ID is not a valid file name, so the review
        // write fails after the redline was stored; the redline is undone.
        let result = store
            .commit_review(Document::from_text("A"), record("../escape"))
            .await;
        assert!(result.is_err());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_unknown_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsDocumentStore::open(tmp.path()).await.unwrap();
        let id = store.put(Document::from_text("A")).await.unwrap();
        store.remove(&id).await.unwrap();
        assert!(matches!(store.remove(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            MemoryDocumentStore::new().remove("x").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_roundtrip_and_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let doc = Document::new(vec![Paragraph::original("A"), Paragraph::unchanged("B", 1)]);

        let store = FsDocumentStore::open(tmp.path()).await.unwrap();
        let id = store.put(doc.clone()).await.unwrap();
        store.put_review(record(&id)).await.unwrap();
        drop(store);

        let store = FsDocumentStore::open(tmp.path()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), doc);
        assert_eq!(store.list().await.unwrap(), vec![id.clone()]);
        assert!(store.get_review(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fs_unknown_and_invalid_ids_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsDocumentStore::open(tmp.path()).await.unwrap();

        assert!(matches!(store.get("missing").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get("../etc/passwd").await, Err(StoreError::NotFound(_))));
        assert!(store.get_review("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_document_file_variants() {
        let tmp = tempfile::TempDir::new().unwrap();
        let text = tmp.path().join("nda_original.txt");
        std::fs::write(&text, "Confidentiality\nTerm").unwrap();
        let doc = read_document_file(&text).await.unwrap();
        assert_eq!(doc.non_blank_texts(), vec!["Confidentiality", "Term"]);

        let missing = read_document_file(&tmp.path().join("nope.txt")).await;
        assert!(matches!(missing, Err(ReviewError::NotFound(_))));

        let broken = tmp.path().join("broken.json");
        std::fs::write(&broken, "{ nope").unwrap();
        let result = read_document_file(&broken).await;
        assert!(matches!(result, Err(ReviewError::MalformedDocument(_))));
    }
}
