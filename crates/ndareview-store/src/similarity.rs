//! Similarity search over previously reviewed NDAs.

use std::sync::Arc;

use async_trait::async_trait;
use ndareview_core::encoder::cosine_sim;
use ndareview_core::{DocumentId, TextEncoder};
use tokio::sync::RwLock;
use tracing::debug;

/// A related document and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarDocument {
    pub document_id: DocumentId,
    pub score: f32,
}

#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn add(&self, document_id: &str, text: &str) -> ndareview_core::Result<()>;

    /// Up to `k` documents, most similar first.
    async fn query(&self, text: &str, k: usize) -> ndareview_core::Result<Vec<SimilarDocument>>;
}

/// Brute-force cosine search over in-memory vectors.
pub struct MemoryIndex {
    encoder: Arc<dyn TextEncoder>,
    entries: RwLock<Vec<(DocumentId, Vec<f32>)>>,
}

impl MemoryIndex {
    pub fn new(encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            encoder,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SimilaritySearch for MemoryIndex {
    /// Re-adding a document replaces its vector.
    async fn add(&self, document_id: &str, text: &str) -> ndareview_core::Result<()> {
        let vector = self.encoder.encode(text)?;
        let mut entries = self.entries.write().await;
        entries.retain(|(id, _)| id != document_id);
        entries.push((document_id.to_string(), vector));
        debug!(document_id, indexed = entries.len(), "indexed document");
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> ndareview_core::Result<Vec<SimilarDocument>> {
        let query = self.encoder.encode(text)?;
        let mut matches: Vec<SimilarDocument> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, vector)| SimilarDocument {
                document_id: id.clone(),
                score: cosine_sim(&query, vector),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        matches.truncate(k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndareview_core::HashingEncoder;

    fn index() -> MemoryIndex {
        MemoryIndex::new(Arc::new(HashingEncoder::default()))
    }

    #[tokio::test]
    async fn nearest_first() {
        let index = index();
        index
            .add("liability", "limitation of liability and indirect damages")
            .await
            .unwrap();
        index
            .add("ip", "intellectual property remains with the discloser")
            .await
            .unwrap();
        index
            .add("law", "governed by the laws of england and wales")
            .await
            .unwrap();

        let results = index
            .query("liability for indirect damages is excluded", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document_id, "liability");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn readding_replaces_entry() {
        let index = index();
        index.add("doc", "first text").await.unwrap();
        index.add("doc", "second text").await.unwrap();
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let index = index();
        assert!(index.is_empty().await);
        assert!(index.query("anything", 5).await.unwrap().is_empty());
    }
}
