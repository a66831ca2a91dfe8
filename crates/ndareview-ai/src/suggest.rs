//! Suggestion generation and validation.
//!
//! Generation is a pure transform over findings. Validation re-scores each
//! proposal and tags the ones at or below the threshold with
//! `needs_review`; it never drops a suggestion.

use std::sync::Arc;

use futures::future::try_join_all;
use ndareview_core::{Findings, Result, Suggestion, Suggestions};
use tracing::{debug, info};

use crate::port::RiskClassifier;

/// Produces exactly one candidate revision for a flagged clause.
pub trait SuggestionWriter: Send + Sync {
    fn propose(&self, clause: &str, context: &[String]) -> String;
}

/// Prefixes the clause with a fixed marker.
#[derive(Debug, Clone)]
pub struct MarkerWriter {
    marker: String,
}

impl MarkerWriter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl SuggestionWriter for MarkerWriter {
    fn propose(&self, clause: &str, _context: &[String]) -> String {
        format!("{}{clause}", self.marker)
    }
}

/// One suggestion per problematic finding, keyed by the same paragraph index.
pub fn generate_suggestions(findings: &Findings, writer: &dyn SuggestionWriter) -> Suggestions {
    findings
        .values()
        .filter(|f| f.is_problematic)
        .map(|f| {
            let suggestion = Suggestion {
                index: f.index,
                clause: f.text.clone(),
                proposed: writer.propose(&f.text, &f.context),
                confidence: f.confidence,
                validation: None,
                needs_review: false,
                notes: Vec::new(),
            };
            (f.index, suggestion)
        })
        .collect()
}

pub struct SuggestionValidator {
    classifier: Arc<dyn RiskClassifier>,
    threshold: f32,
}

impl SuggestionValidator {
    pub fn new(classifier: Arc<dyn RiskClassifier>, threshold: f32) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    /// Score every proposal. A score above the threshold passes; anything
    /// else is flagged `needs_review`. All-or-nothing: one failed call fails
    /// the whole map.
    pub async fn validate(&self, suggestions: Suggestions) -> Result<Suggestions> {
        let scores = try_join_all(
            suggestions
                .values()
                .map(|s| self.classifier.risk(&s.proposed)),
        )
        .await?;

        let validated: Suggestions = suggestions
            .into_iter()
            .zip(scores)
            .map(|((index, mut suggestion), score)| {
                suggestion.validation = Some(score);
                if score <= self.threshold {
                    suggestion.needs_review = true;
                    debug!(index, score, "suggestion needs review");
                }
                (index, suggestion)
            })
            .collect();

        info!(
            suggestions = validated.len(),
            needs_review = validated.values().filter(|s| s.needs_review).count(),
            "suggestions validated"
        );
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{ClassificationPort, ModelHandle, PortScorer};
    use crate::test_support::{FailingClassifier, RuleClassifier};
    use ndareview_core::{ClauseFinding, ReviewConfig, ReviewError};

    fn finding(index: usize, text: &str, problematic: bool) -> (usize, ClauseFinding) {
        (
            index,
            ClauseFinding {
                index,
                text: text.to_string(),
                is_problematic: problematic,
                confidence: 0.42,
                context: vec!["before".into()],
            },
        )
    }

    fn validator(port: Arc<dyn ClassificationPort>) -> SuggestionValidator {
        let config = ReviewConfig::default();
        let scorer = PortScorer::new(ModelHandle::new(port), &config);
        SuggestionValidator::new(Arc::new(scorer), config.validation_threshold)
    }

    #[test]
    fn marker_writer_prefixes() {
        let writer = MarkerWriter::new("Suggested revision: ");
        assert_eq!(
            writer.propose("Liability is unlimited.", &[]),
            "Suggested revision: Liability is unlimited."
        );
    }

    #[test]
    fn generator_skips_unproblematic_and_carries_confidence() {
        let findings: Findings = [
            finding(1, "Termination at will.", true),
            finding(3, "Warranty disclaimed.", false),
        ]
        .into_iter()
        .collect();

        let suggestions = generate_suggestions(&findings, &MarkerWriter::new(">> "));
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[&1];
        assert_eq!(s.clause, "Termination at will.");
        assert_eq!(s.proposed, ">> Termination at will.");
        assert_eq!(s.confidence, 0.42);
        assert!(!s.needs_review);
    }

    #[test]
    fn generator_is_pure() {
        let findings: Findings = [finding(0, "Liability.", true)].into_iter().collect();
        let writer = MarkerWriter::new("x ");
        assert_eq!(
            generate_suggestions(&findings, &writer),
            generate_suggestions(&findings, &writer)
        );
    }

    #[tokio::test]
    async fn validator_tags_at_or_below_threshold() {
        let findings: Findings = [finding(0, "pass", true), finding(2, "fail", true)]
            .into_iter()
            .collect();
        let suggestions = generate_suggestions(&findings, &MarkerWriter::new(""));

        let port = Arc::new(RuleClassifier::new(&[("pass", 0.9)], 0.1));
        let validated = validator(port).validate(suggestions.clone()).await.unwrap();

        assert_eq!(
            validated.keys().collect::<Vec<_>>(),
            suggestions.keys().collect::<Vec<_>>()
        );
        for s in validated.values() {
            let score = s.validation.unwrap();
            assert_eq!(s.needs_review, score <= 0.7, "index {}", s.index);
        }
        assert!(!validated[&0].needs_review);
        assert!(validated[&2].needs_review);
        // Carried confidence is untouched.
        assert_eq!(validated[&2].confidence, 0.42);
    }

    #[tokio::test]
    async fn score_equal_to_threshold_needs_review() {
        let findings: Findings = [finding(0, "edge", true), finding(1, "above", true)]
            .into_iter()
            .collect();
        let suggestions = generate_suggestions(&findings, &MarkerWriter::new(""));

        let port = Arc::new(RuleClassifier::new(&[("edge", 0.75), ("above", 0.875)], 0.0));
        let scorer = PortScorer::new(ModelHandle::new(port), &ReviewConfig::default());
        let validator = SuggestionValidator::new(Arc::new(scorer), 0.75);
        let validated = validator.validate(suggestions).await.unwrap();

        assert!(validated[&0].needs_review);
        assert!(!validated[&1].needs_review);
    }

    #[tokio::test]
    async fn validator_failure_is_all_or_nothing() {
        let findings: Findings = [finding(0, "ok", true), finding(1, "boom", true)]
            .into_iter()
            .collect();
        let suggestions = generate_suggestions(&findings, &MarkerWriter::new(""));
        let port = Arc::new(FailingClassifier::new(&["boom"]));
        let result = validator(port).validate(suggestions).await;
        assert!(matches!(result, Err(ReviewError::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn empty_map_validates_to_empty() {
        let port = Arc::new(RuleClassifier::new(&[], 0.9));
        let validated = validator(port).validate(Suggestions::new()).await.unwrap();
        assert!(validated.is_empty());
    }
}
