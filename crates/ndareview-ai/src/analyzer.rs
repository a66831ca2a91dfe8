//! Clause analysis: lexical risk screening followed by model scoring.

use std::sync::Arc;

use futures::future::try_join_all;
use ndareview_core::{ClauseFinding, Document, Findings, Result, ReviewConfig};
use tracing::{debug, info};

use crate::port::RiskClassifier;

pub struct ClauseAnalyzer {
    config: ReviewConfig,
    classifier: Arc<dyn RiskClassifier>,
}

impl ClauseAnalyzer {
    pub fn new(config: ReviewConfig, classifier: Arc<dyn RiskClassifier>) -> Self {
        Self { config, classifier }
    }

    /// Flag every non-blank paragraph containing a risk pattern and score it.
    ///
    /// Scoring calls run concurrently; the first failure aborts the pass and
    /// no findings are returned.
    pub async fn analyze(&self, document: &Document) -> Result<Findings> {
        let flagged: Vec<usize> = document
            .paragraphs
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_blank())
            .filter(|(_, p)| !self.config.matched_patterns(&p.text).is_empty())
            .map(|(i, _)| i)
            .collect();

        debug!(
            document_id = %document.id,
            paragraphs = document.len(),
            flagged = flagged.len(),
            "lexical screen"
        );

        let scores = try_join_all(
            flagged
                .iter()
                .map(|&i| self.classifier.risk(&document.paragraphs[i].text)),
        )
        .await?;

        let findings: Findings = flagged
            .into_iter()
            .zip(scores)
            .map(|(index, confidence)| {
                let finding = ClauseFinding {
                    index,
                    text: document.paragraphs[index].text.clone(),
                    is_problematic: true,
                    confidence,
                    context: context_of(document, index),
                };
                (index, finding)
            })
            .collect();

        info!(document_id = %document.id, findings = findings.len(), "clause analysis complete");
        Ok(findings)
    }
}

/// Nearest non-blank paragraph before and after `index`.
fn context_of(document: &Document, index: usize) -> Vec<String> {
    let paragraphs = &document.paragraphs;
    let before = paragraphs[..index].iter().rev().find(|p| !p.is_blank());
    let after = paragraphs[index + 1..].iter().find(|p| !p.is_blank());
    before
        .into_iter()
        .chain(after)
        .map(|p| p.text.clone())
        .collect()
}
