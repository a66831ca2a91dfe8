//! Append-only reviewer feedback log.
//!
//! Appends for the same document are serialized through a per-document lock;
//! appends for different documents never contend.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndareview_core::{DocumentId, Feedback};
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::StoreError;

#[async_trait]
pub trait FeedbackLog: Send + Sync {
    async fn append(&self, feedback: Feedback) -> Result<(), StoreError>;

    /// Feedback for one document, oldest first.
    async fn history(&self, document_id: &str) -> Result<Vec<Feedback>, StoreError>;

    /// All feedback, oldest first.
    async fn all(&self) -> Result<Vec<Feedback>, StoreError>;

    async fn statistics(&self) -> Result<FeedbackStats, StoreError> {
        Ok(FeedbackStats::from_feedback(&self.all().await?))
    }
}

/// Aggregate view over the feedback log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackStats {
    pub total: usize,
    pub average_sentiment: f32,
    /// `YYYY-MM` → feedback count.
    pub by_month: BTreeMap<String, usize>,
}

impl FeedbackStats {
    pub fn from_feedback(feedback: &[Feedback]) -> Self {
        if feedback.is_empty() {
            return Self::default();
        }
        let mut by_month = BTreeMap::new();
        for f in feedback {
            *by_month
                .entry(f.timestamp.format("%Y-%m").to_string())
                .or_insert(0) += 1;
        }
        let sum: f32 = feedback.iter().map(|f| f.sentiment).sum();
        Self {
            total: feedback.len(),
            average_sentiment: sum / feedback.len() as f32,
            by_month,
        }
    }
}

/// One async mutex per document ID.
///
/// Entries nobody holds or waits on are dropped on the next `lock` call, so
/// the map stays bounded by the number of documents in flight.
#[derive(Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    pub async fn lock(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Holders and waiters each own a clone; count 1 means idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(document_id.to_string())
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Documents with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sort_by_time(feedback: &mut [Feedback]) {
    feedback.sort_by_key(|f| f.timestamp);
}

#[derive(Default)]
pub struct MemoryFeedbackLog {
    entries: RwLock<Vec<Feedback>>,
}

impl MemoryFeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackLog for MemoryFeedbackLog {
    async fn append(&self, feedback: Feedback) -> Result<(), StoreError> {
        self.entries.write().await.push(feedback);
        Ok(())
    }

    async fn history(&self, document_id: &str) -> Result<Vec<Feedback>, StoreError> {
        let mut history: Vec<Feedback> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|f| f.document_id == document_id)
            .cloned()
            .collect();
        sort_by_time(&mut history);
        Ok(history)
    }

    async fn all(&self) -> Result<Vec<Feedback>, StoreError> {
        let mut all = self.entries.read().await.clone();
        sort_by_time(&mut all);
        Ok(all)
    }
}

/// JSON Lines files under a directory, one file per document.
pub struct FsFeedbackLog {
    dir: PathBuf,
    locks: DocumentLocks,
}

impl FsFeedbackLog {
    pub async fn open(dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(dir).await?;
        info!(dir = %dir.display(), "opened feedback log");
        Ok(Self {
            dir: dir.to_path_buf(),
            locks: DocumentLocks::default(),
        })
    }

    fn log_path(&self, document_id: &str) -> Result<PathBuf, StoreError> {
        if document_id.is_empty()
            || !document_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(StoreError::NotFound(format!("document {document_id}")));
        }
        Ok(self.dir.join(format!("{document_id}.jsonl")))
    }

    async fn read_log(path: &Path) -> Result<Vec<Feedback>, StoreError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl FeedbackLog for FsFeedbackLog {
    async fn append(&self, feedback: Feedback) -> Result<(), StoreError> {
        let path = self.log_path(&feedback.document_id)?;
        let mut line = serde_json::to_string(&feedback)?;
        line.push('\n');

        let _guard = self.locks.lock(&feedback.document_id).await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(document_id = %feedback.document_id, "feedback appended");
        Ok(())
    }

    async fn history(&self, document_id: &str) -> Result<Vec<Feedback>, StoreError> {
        let path = self.log_path(document_id)?;
        let _guard = self.locks.lock(document_id).await;
        let mut history = Self::read_log(&path).await?;
        sort_by_time(&mut history);
        Ok(history)
    }

    async fn all(&self) -> Result<Vec<Feedback>, StoreError> {
        let mut all = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "jsonl") {
                all.extend(Self::read_log(&path).await?);
            }
        }
        sort_by_time(&mut all);
        Ok(all)
    }
}
