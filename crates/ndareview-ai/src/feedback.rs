//! Reviewer feedback: interpretation and suggestion adjustment.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use ndareview_core::{Feedback, Result, ReviewConfig, ReviewRecord, Suggestion, Suggestions};
use regex::Regex;
use tracing::{debug, info};

use crate::port::SentimentClassifier;

/// "clause 3", "Paragraph 12", "section 2": 1-based paragraph references.
static PARAGRAPH_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:clause|paragraph|section)\s+(\d+)\b").expect("valid regex")
});

/// Split feedback into sentence-level key points, trimmed, empties dropped.
pub fn extract_key_points(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct FeedbackInterpreter {
    classifier: Arc<dyn SentimentClassifier>,
}

impl FeedbackInterpreter {
    pub fn new(classifier: Arc<dyn SentimentClassifier>) -> Self {
        Self { classifier }
    }

    pub async fn interpret(&self, document_id: &str, text: &str) -> Result<Feedback> {
        let sentiment = self.classifier.sentiment(text).await?;
        let key_points = extract_key_points(text);
        debug!(document_id, sentiment, key_points = key_points.len(), "feedback interpreted");
        Ok(Feedback {
            document_id: document_id.to_string(),
            text: text.to_string(),
            sentiment,
            key_points,
            timestamp: Utc::now(),
        })
    }
}

/// Recomputes a document's suggestions from its stored review plus feedback.
///
/// Always starts from the validated suggestions in the review record, never
/// from an earlier adjustment, so the same feedback yields the same map.
pub struct SuggestionAdjuster {
    config: ReviewConfig,
}

impl SuggestionAdjuster {
    pub fn new(config: ReviewConfig) -> Self {
        Self { config }
    }

    /// Whether a key point is aimed at this suggestion: by paragraph number
    /// or by sharing a risk pattern with the clause.
    pub fn targets(&self, key_point: &str, suggestion: &Suggestion) -> bool {
        let by_number = PARAGRAPH_REF
            .captures_iter(key_point)
            .filter_map(|c| c[1].parse::<usize>().ok())
            .any(|n| n == suggestion.index + 1);
        if by_number {
            return true;
        }
        let clause_patterns = self.config.matched_patterns(&suggestion.clause);
        self.config
            .matched_patterns(key_point)
            .iter()
            .any(|p| clause_patterns.contains(p))
    }

    /// Adjusted suggestions. No review record means nothing to adjust.
    ///
    /// Suggestions targeted by at least one key point are adjusted; when no
    /// key point targets anything, the feedback applies to every suggestion.
    pub fn adjust(&self, record: Option<&ReviewRecord>, feedback: &Feedback) -> Suggestions {
        let Some(record) = record else {
            debug!(document_id = %feedback.document_id, "no review record, nothing to adjust");
            return Suggestions::new();
        };

        let targeted: Vec<(usize, Vec<String>)> = record
            .suggestions
            .iter()
            .map(|(&index, s)| {
                let points = feedback
                    .key_points
                    .iter()
                    .filter(|k| self.targets(k, s))
                    .cloned()
                    .collect();
                (index, points)
            })
            .collect();
        let any_targeted = targeted.iter().any(|(_, points)| !points.is_empty());

        let adjusted: Suggestions = record
            .suggestions
            .iter()
            .zip(targeted)
            .map(|((&index, base), (_, points))| {
                let suggestion = if points.is_empty() && any_targeted {
                    base.clone()
                } else {
                    self.apply(base, feedback.sentiment, points)
                };
                (index, suggestion)
            })
            .collect();

        info!(
            document_id = %feedback.document_id,
            sentiment = feedback.sentiment,
            suggestions = adjusted.len(),
            needs_review = adjusted.values().filter(|s| s.needs_review).count(),
            "suggestions adjusted"
        );
        adjusted
    }

    fn apply(&self, base: &Suggestion, sentiment: f32, notes: Vec<String>) -> Suggestion {
        let confidence = (base.confidence + sentiment) / 2.0;
        Suggestion {
            confidence,
            needs_review: base.needs_review
                || confidence <= self.config.validation_threshold
                || sentiment < self.config.positive_sentiment,
            notes,
            ..base.clone()
        }
    }
}
