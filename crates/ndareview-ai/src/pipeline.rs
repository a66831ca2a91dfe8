//! Review service: the upload → analyze → redline → feedback → accept loop,
//! plus training and model loading.
//!
//! Each request runs its stages to completion before anything is persisted,
//! so a failure in any stage leaves the stores untouched.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use futures::future::try_join_all;
use ndareview_core::derive::derive_examples;
use ndareview_core::{
    Acceptance, Document, DocumentId, Feedback, Result, ReviewConfig, ReviewError, ReviewRecord,
    Suggestions, TextEncoder, synthesize_clean, synthesize_redline,
};
use ndareview_store::{
    DocumentStore, FeedbackLog, FeedbackStats, SimilarDocument, SimilaritySearch,
    read_document_file,
};
use tracing::{info, warn};

use crate::analyzer::ClauseAnalyzer;
use crate::feedback::{FeedbackInterpreter, SuggestionAdjuster};
use crate::port::{ClassificationPort, ModelHandle, PortScorer};
use crate::suggest::{MarkerWriter, SuggestionValidator, SuggestionWriter, generate_suggestions};
use crate::trainer::{self, Trainer, TrainingReport};

/// The three logically independent classifier slots.
///
/// A reload of several slots happens under one write lock, and requests take
/// their handles through [`pin`](Self::pin) under the read lock, so no request
/// sees a half-applied reload.
#[derive(Clone, Default)]
pub struct ModelSet {
    pub risk: ModelHandle,
    pub validation: ModelHandle,
    pub sentiment: ModelHandle,
    reload: Arc<RwLock<()>>,
}

impl ModelSet {
    pub fn unloaded() -> Self {
        Self::default()
    }

    /// Separate slots that start out sharing the same weights.
    pub fn shared(port: Arc<dyn ClassificationPort>) -> Self {
        Self {
            risk: ModelHandle::new(Arc::clone(&port)),
            validation: ModelHandle::new(Arc::clone(&port)),
            sentiment: ModelHandle::new(port),
            reload: Arc::default(),
        }
    }

    /// Detached handles over the weights active right now, consistent across
    /// slots. Later swaps do not reach them.
    pub fn pin(&self) -> ModelSet {
        let _guard = self.reload.read().unwrap_or_else(|e| e.into_inner());
        ModelSet {
            risk: self.risk.pinned(),
            validation: self.validation.pinned(),
            sentiment: self.sentiment.pinned(),
            reload: Arc::default(),
        }
    }

    fn swap(&self, target: ModelTarget, port: Arc<dyn ClassificationPort>) {
        let _guard = self.reload.write().unwrap_or_else(|e| e.into_inner());
        match target {
            ModelTarget::All => {
                self.risk.swap(Arc::clone(&port));
                self.validation.swap(Arc::clone(&port));
                self.sentiment.swap(port);
            }
            ModelTarget::Risk => {
                self.risk.swap(port);
            }
            ModelTarget::Validation => {
                self.validation.swap(port);
            }
            ModelTarget::Sentiment => {
                self.sentiment.swap(port);
            }
        }
    }
}

/// Which slot a loaded model replaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModelTarget {
    #[default]
    All,
    Risk,
    Validation,
    Sentiment,
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub document_id: DocumentId,
    pub redline_id: DocumentId,
    pub findings: usize,
    pub suggestions: Suggestions,
}

#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    pub feedback: Feedback,
    /// New redline built from the adjusted suggestions; `None` when the
    /// document has not been analyzed yet.
    pub redline_id: Option<DocumentId>,
    pub suggestions: Suggestions,
}

pub struct ReviewService {
    config: ReviewConfig,
    documents: Arc<dyn DocumentStore>,
    feedback: Arc<dyn FeedbackLog>,
    memory: Arc<dyn SimilaritySearch>,
    encoder: Arc<dyn TextEncoder>,
    models: ModelSet,
    writer: Arc<dyn SuggestionWriter>,
}

impl ReviewService {
    pub fn new(
        config: ReviewConfig,
        documents: Arc<dyn DocumentStore>,
        feedback: Arc<dyn FeedbackLog>,
        memory: Arc<dyn SimilaritySearch>,
        encoder: Arc<dyn TextEncoder>,
        models: ModelSet,
    ) -> Self {
        let writer = Arc::new(MarkerWriter::new(config.suggestion_marker.clone()));
        Self {
            config,
            documents,
            feedback,
            memory,
            encoder,
            models,
            writer,
        }
    }

    /// Replace the suggestion writer.
    pub fn with_writer(mut self, writer: Arc<dyn SuggestionWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    fn scorer(&self, handle: &ModelHandle) -> Arc<PortScorer> {
        Arc::new(PortScorer::new(handle.clone(), &self.config))
    }

    /// Parse, store, and index a new document.
    pub async fn upload(&self, bytes: &[u8]) -> Result<DocumentId> {
        let document = Document::parse(bytes)?;
        let text = document.non_blank_texts().join("\n");
        let id = self.documents.put(document).await?;
        self.memory.add(&id, &text).await?;
        info!(document_id = %id, "document uploaded");
        Ok(id)
    }

    /// Analyze, generate, validate, then persist the redline and review record.
    pub async fn analyze(&self, document_id: &str) -> Result<ReviewOutcome> {
        let document = self.documents.get(document_id).await?;
        let models = self.models.pin();

        let analyzer = ClauseAnalyzer::new(self.config.clone(), self.scorer(&models.risk));
        let findings = analyzer.analyze(&document).await?;

        let suggestions = generate_suggestions(&findings, self.writer.as_ref());
        let validator = SuggestionValidator::new(
            self.scorer(&models.validation),
            self.config.validation_threshold,
        );
        let suggestions = validator.validate(suggestions).await?;

        let redline = synthesize_redline(&document, &suggestions);
        let record = ReviewRecord {
            document_id: document.id.clone(),
            redline_id: redline.id.clone(),
            findings,
            suggestions,
        };
        let findings = record.findings.len();
        let suggestions = record.suggestions.clone();
        let redline_id = self.documents.commit_review(redline, record).await?;

        info!(
            document_id,
            redline_id = %redline_id,
            findings,
            suggestions = suggestions.len(),
            "review complete"
        );
        Ok(ReviewOutcome {
            document_id: document.id,
            redline_id,
            findings,
            suggestions,
        })
    }

    /// Record feedback and produce a redline from the adjusted suggestions.
    pub async fn submit_feedback(&self, document_id: &str, text: &str) -> Result<FeedbackOutcome> {
        let document = self.documents.get(document_id).await?;

        let interpreter = FeedbackInterpreter::new(self.scorer(&self.models.sentiment));
        let feedback = interpreter.interpret(document_id, text).await?;
        self.feedback.append(feedback.clone()).await?;

        let record = self.documents.get_review(document_id).await?;
        let adjuster = SuggestionAdjuster::new(self.config.clone());
        let suggestions = adjuster.adjust(record.as_ref(), &feedback);

        let redline_id = match record {
            Some(_) => Some(
                self.documents
                    .put(synthesize_redline(&document, &suggestions))
                    .await?,
            ),
            None => {
                warn!(document_id, "feedback on a document that has not been analyzed");
                None
            }
        };

        Ok(FeedbackOutcome {
            feedback,
            redline_id,
            suggestions,
        })
    }

    /// Resolve a redline into a clean document.
    pub async fn accept(&self, redline_id: &str, acceptance: &Acceptance) -> Result<DocumentId> {
        let redline = self.documents.get(redline_id).await?;
        let clean = synthesize_clean(&redline, acceptance);
        let id = self.documents.put(clean).await?;
        info!(redline_id, clean_id = %id, "redline resolved");
        Ok(id)
    }

    pub async fn download(&self, document_id: &str) -> Result<Vec<u8>> {
        Ok(self.documents.raw_bytes(document_id).await?)
    }

    pub async fn document(&self, document_id: &str) -> Result<Document> {
        Ok(self.documents.get(document_id).await?)
    }

    pub async fn review(&self, document_id: &str) -> Result<Option<ReviewRecord>> {
        Ok(self.documents.get_review(document_id).await?)
    }

    pub async fn history(&self, document_id: &str) -> Result<Vec<Feedback>> {
        Ok(self.feedback.history(document_id).await?)
    }

    pub async fn statistics(&self) -> Result<FeedbackStats> {
        Ok(self.feedback.statistics().await?)
    }

    pub async fn similar(&self, text: &str, k: usize) -> Result<Vec<SimilarDocument>> {
        self.memory.query(text, k).await
    }

    /// Derive examples from index-paired document files and train a model.
    pub async fn train(
        &self,
        originals: &[PathBuf],
        redlines: &[PathBuf],
        cleans: &[PathBuf],
        output_dir: &Path,
    ) -> Result<TrainingReport> {
        if originals.len() != redlines.len() || originals.len() != cleans.len() {
            return Err(ReviewError::MismatchedTrainingData(format!(
                "path lists differ in length: {} original, {} redline, {} clean",
                originals.len(),
                redlines.len(),
                cleans.len()
            )));
        }

        let originals = read_all(originals).await?;
        let redlines = read_all(redlines).await?;
        let cleans = read_all(cleans).await?;
        let examples = derive_examples(
            &originals,
            &redlines,
            &cleans,
            self.config.paragraph_tolerance,
        )?;

        let trainer = Trainer::new(Arc::clone(&self.encoder), self.config.holdout_fraction);
        let output_dir = output_dir.to_path_buf();
        tokio::task::spawn_blocking(move || trainer.train(&examples, &output_dir))
            .await
            .map_err(|e| ReviewError::Storage(format!("training task failed: {e}")))?
    }

    /// Load a model artifact and swap it into the targeted slots.
    pub fn load_model(&self, dir: &Path, target: ModelTarget) -> Result<()> {
        let port = trainer::load_model(dir, &self.config, Arc::clone(&self.encoder))?;
        self.models.swap(target, port);
        info!(dir = %dir.display(), ?target, "model loaded");
        Ok(())
    }
}

async fn read_all(paths: &[PathBuf]) -> Result<Vec<Document>> {
    try_join_all(paths.iter().map(|p| read_document_file(p))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingClassifier, FixedClassifier, RuleClassifier};
    use ndareview_core::{HashingEncoder, ParagraphKind};
    use ndareview_store::{MemoryDocumentStore, MemoryFeedbackLog, MemoryIndex, StoreError};

    const NDA: &str = "Mutual agreement between Acme and Beta.\n\
                       The Recipient shall maintain confidentiality for five years.\n\
                       Deliveries are scheduled monthly.\n\
                       Liability of the Discloser is unlimited.";

    struct Harness {
        service: ReviewService,
        documents: Arc<MemoryDocumentStore>,
    }

    fn harness(models: ModelSet) -> Harness {
        let encoder: Arc<dyn TextEncoder> = Arc::new(HashingEncoder::default());
        let documents = Arc::new(MemoryDocumentStore::new());
        let service = ReviewService::new(
            ReviewConfig::default(),
            documents.clone(),
            Arc::new(MemoryFeedbackLog::new()),
            Arc::new(MemoryIndex::new(Arc::clone(&encoder))),
            encoder,
            models,
        );
        Harness { service, documents }
    }

    fn rules() -> ModelSet {
        ModelSet::shared(Arc::new(RuleClassifier::new(
            &[("Suggested revision: Liability", 0.9), ("unfair", 0.1)],
            0.6,
        )))
    }

    #[tokio::test]
    async fn analyze_persists_redline_and_review() {
        let h = harness(rules());
        let id = h.service.upload(NDA.as_bytes()).await.unwrap();
        let outcome = h.service.analyze(&id).await.unwrap();

        assert_eq!(outcome.findings, 2);
        assert_eq!(outcome.suggestions.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        // Validation score 0.6 for confidentiality, 0.9 for liability.
        assert!(outcome.suggestions[&1].needs_review);
        assert!(!outcome.suggestions[&3].needs_review);

        let redline = h.service.document(&outcome.redline_id).await.unwrap();
        assert_eq!(redline.len(), 4 + 2);
        assert_eq!(redline.count_kind(ParagraphKind::Proposed), 2);

        let record = h.service.review(&id).await.unwrap().unwrap();
        assert_eq!(record.redline_id, outcome.redline_id);
        assert!(record.is_consistent());
    }

    #[tokio::test]
    async fn failed_validation_persists_nothing() {
        let models = ModelSet::shared(Arc::new(FixedClassifier::new(0.8)));
        models
            .validation
            .swap(Arc::new(FailingClassifier::new(&["Suggested revision"])));
        let h = harness(models);
        let id = h.service.upload(NDA.as_bytes()).await.unwrap();

        let result = h.service.analyze(&id).await;
        assert!(matches!(result, Err(ReviewError::ModelUnavailable(_))));
        assert_eq!(h.documents.list().await.unwrap(), vec![id.clone()]);
        assert!(h.service.review(&id).await.unwrap().is_none());
    }

    /// Delegates to a memory store but refuses review records.
    struct RejectingReviews(MemoryDocumentStore);

    #[async_trait::async_trait]
    impl DocumentStore for RejectingReviews {
        async fn get(&self, id: &str) -> std::result::Result<Document, StoreError> {
            self.0.get(id).await
        }

        async fn put(&self, document: Document) -> std::result::Result<DocumentId, StoreError> {
            self.0.put(document).await
        }

        async fn list(&self) -> std::result::Result<Vec<DocumentId>, StoreError> {
            self.0.list().await
        }

        async fn put_review(&self, _record: ReviewRecord) -> std::result::Result<(), StoreError> {
            Err(StoreError::Other("review storage is read-only".into()))
        }

        async fn get_review(
            &self,
            document_id: &str,
        ) -> std::result::Result<Option<ReviewRecord>, StoreError> {
            self.0.get_review(document_id).await
        }

        async fn remove(&self, id: &str) -> std::result::Result<(), StoreError> {
            self.0.remove(id).await
        }
    }

    #[tokio::test]
    async fn failed_review_write_leaves_no_redline() {
        let encoder: Arc<dyn TextEncoder> = Arc::new(HashingEncoder::default());
        let documents = Arc::new(RejectingReviews(MemoryDocumentStore::new()));
        let service = ReviewService::new(
            ReviewConfig::default(),
            documents.clone(),
            Arc::new(MemoryFeedbackLog::new()),
            Arc::new(MemoryIndex::new(Arc::clone(&encoder))),
            encoder,
            rules(),
        );
        let id = service.upload(NDA.as_bytes()).await.unwrap();

        assert!(service.analyze(&id).await.is_err());
        assert_eq!(documents.list().await.unwrap(), vec![id.clone()]);
        assert!(service.review(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pinned_models_ignore_later_reload() {
        let models = ModelSet::shared(Arc::new(FixedClassifier::new(0.2)));
        let pinned = models.pin();
        models.swap(ModelTarget::All, Arc::new(FixedClassifier::new(0.9)));

        let config = ReviewConfig::default();
        let before = PortScorer::new(pinned.risk.clone(), &config);
        let after = PortScorer::new(models.pin().validation.clone(), &config);
        assert!((before.distribution("x").await.unwrap().positive() - 0.2).abs() < 1e-6);
        assert!((after.distribution("x").await.unwrap().positive() - 0.9).abs() < 1e-6);
        for handle in [&pinned.risk, &pinned.validation, &pinned.sentiment] {
            let port = handle.snapshot().unwrap();
            assert!((port.score("x", 8).await.unwrap().positive() - 0.2).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn pinning_unloaded_slots_stays_unavailable() {
        let pinned = ModelSet::unloaded().pin();
        assert!(!pinned.risk.is_loaded());
        assert!(matches!(
            pinned.validation.snapshot(),
            Err(ReviewError::ModelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unloaded_models_are_unavailable() {
        let h = harness(ModelSet::unloaded());
        let id = h.service.upload(NDA.as_bytes()).await.unwrap();
        assert!(matches!(
            h.service.analyze(&id).await,
            Err(ReviewError::ModelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unknown_document_not_found() {
        let h = harness(rules());
        assert!(matches!(
            h.service.analyze("missing").await,
            Err(ReviewError::NotFound(_))
        ));
        assert!(matches!(
            h.service.submit_feedback("missing", "Fine.").await,
            Err(ReviewError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn malformed_upload_rejected() {
        let h = harness(rules());
        assert!(matches!(
            h.service.upload(&[0xff, 0xfe, 0x00]).await,
            Err(ReviewError::MalformedDocument(_))
        ));
    }

    #[tokio::test]
    async fn feedback_adjusts_and_is_idempotent() {
        let h = harness(rules());
        let id = h.service.upload(NDA.as_bytes()).await.unwrap();
        h.service.analyze(&id).await.unwrap();

        let text = "The liability clause is unfair. Revise clause 4.";
        let first = h.service.submit_feedback(&id, text).await.unwrap();
        let second = h.service.submit_feedback(&id, text).await.unwrap();

        assert_eq!(first.feedback.key_points.len(), 2);
        assert_eq!(first.suggestions, second.suggestions);
        let liability = &first.suggestions[&3];
        assert!(liability.needs_review);
        assert_eq!(liability.notes.len(), 2);
        // Untargeted suggestion is passed through.
        assert!(first.suggestions[&1].notes.is_empty());

        let redline = h.service.document(first.redline_id.as_ref().unwrap()).await.unwrap();
        assert_eq!(redline.count_kind(ParagraphKind::Removed), 2);

        assert_eq!(h.service.history(&id).await.unwrap().len(), 2);
        let stats = h.service.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn feedback_before_analysis_has_no_redline() {
        let h = harness(rules());
        let id = h.service.upload(NDA.as_bytes()).await.unwrap();
        let outcome = h.service.submit_feedback(&id, "Looks fine.").await.unwrap();
        assert!(outcome.redline_id.is_none());
        assert!(outcome.suggestions.is_empty());
        assert_eq!(h.service.history(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn accept_and_download() {
        let h = harness(rules());
        let id = h.service.upload(NDA.as_bytes()).await.unwrap();
        let outcome = h.service.analyze(&id).await.unwrap();

        let all = h.service.accept(&outcome.redline_id, &Acceptance::All).await.unwrap();
        let clean = h.service.document(&all).await.unwrap();
        assert_eq!(clean.len(), 4);
        assert!(clean.paragraphs[3].text.starts_with("Suggested revision: "));

        let none = h.service.accept(&outcome.redline_id, &Acceptance::none()).await.unwrap();
        let restored = String::from_utf8(h.service.download(&none).await.unwrap()).unwrap();
        assert_eq!(restored, NDA);

        let marked = String::from_utf8(h.service.download(&outcome.redline_id).await.unwrap()).unwrap();
        assert!(marked.contains("[-Liability of the Discloser is unlimited.-]"));
        assert!(marked.contains("{+Suggested revision: Liability of the Discloser is unlimited.+}"));
    }

    #[tokio::test]
    async fn similar_finds_uploaded_nda() {
        let h = harness(rules());
        let id = h.service.upload(NDA.as_bytes()).await.unwrap();
        h.service
            .upload(b"Software license for internal use only.")
            .await
            .unwrap();

        let results = h
            .service
            .similar("the recipient shall maintain confidentiality", 1)
            .await
            .unwrap();
        assert_eq!(results[0].document_id, id);
    }

    #[tokio::test]
    async fn train_from_files_then_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let write = |name: &str, text: &str| {
            let path = tmp.path().join(name);
            std::fs::write(&path, text).unwrap();
            path
        };
        let originals = vec![
            write("a_original.txt", "Intro.\nLiability is unlimited.\nTermination at will."),
            write("b_original.txt", "Intro.\nLiability has no cap.\nWarranty is disclaimed."),
        ];
        let redlines = vec![
            write("a_redline.txt", "Intro.\nLiability is capped at fees paid.\nTermination on notice."),
            write("b_redline.txt", "Intro.\nLiability is capped at fees paid.\nWarranty is limited."),
        ];
        let cleans = vec![
            write("a_clean.txt", "Intro.\nLiability is capped at fees paid.\nTermination by agreement."),
            write("b_clean.txt", "Intro.\nLiability is capped at fees paid.\nWarranty is limited."),
        ];

        let h = harness(ModelSet::unloaded());
        let model_dir = tmp.path().join("model");
        let report = h
            .service
            .train(&originals, &redlines, &cleans, &model_dir)
            .await
            .unwrap();
        assert_eq!(report.num_samples, 4);
        assert_eq!(report.num_train + report.evaluation.num_samples, 4);

        h.service.load_model(&model_dir, ModelTarget::All).unwrap();
        assert!(h.service.models().risk.is_loaded());
        assert!(h.service.models().sentiment.is_loaded());

        let id = h.service.upload(NDA.as_bytes()).await.unwrap();
        assert!(h.service.analyze(&id).await.is_ok());
    }

    #[tokio::test]
    async fn train_rejects_mismatched_lists() {
        let h = harness(ModelSet::unloaded());
        let tmp = tempfile::TempDir::new().unwrap();
        let result = h
            .service
            .train(&[PathBuf::from("a")], &[], &[], tmp.path())
            .await;
        assert!(matches!(result, Err(ReviewError::MismatchedTrainingData(_))));
    }

    #[tokio::test]
    async fn load_model_targets_one_slot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let examples = vec![
            ndareview_core::TrainingExample::new("capped liability", true),
            ndareview_core::TrainingExample::new("unlimited liability", false),
        ];
        Trainer::new(Arc::new(HashingEncoder::default()), 0.5)
            .train(&examples, tmp.path())
            .unwrap();

        let h = harness(ModelSet::unloaded());
        h.service.load_model(tmp.path(), ModelTarget::Sentiment).unwrap();
        assert!(h.service.models().sentiment.is_loaded());
        assert!(!h.service.models().risk.is_loaded());
    }
}
