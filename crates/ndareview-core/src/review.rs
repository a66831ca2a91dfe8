//! Review artefacts exchanged between pipeline stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::DocumentId;

/// Result of scanning one paragraph for risk patterns and scoring it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseFinding {
    /// Paragraph index in the analysed document.
    pub index: usize,
    pub text: String,
    pub is_problematic: bool,
    /// P(problematic) from the risk classifier.
    pub confidence: f32,
    /// Nearest non-empty neighbours: preceding first, then following.
    pub context: Vec<String>,
}

/// Findings keyed by paragraph index.
pub type Findings = BTreeMap<usize, ClauseFinding>;

/// A proposed revision for one flagged clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Paragraph index of the flagged clause.
    pub index: usize,
    pub clause: String,
    pub proposed: String,
    /// Carried from the clause finding; the adjuster may blend in sentiment.
    pub confidence: f32,
    /// Score the validator gave the proposed text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<f32>,
    #[serde(default)]
    pub needs_review: bool,
    /// Reviewer feedback points attached by the adjuster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Suggestions keyed by paragraph index.
pub type Suggestions = BTreeMap<usize, Suggestion>;

/// Interpreted reviewer feedback. Append-only once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub document_id: DocumentId,
    pub text: String,
    /// P(positive) from the sentiment classifier.
    pub sentiment: f32,
    pub key_points: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Supervised pair derived from an original/redline/clean triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    /// 1 when the redline's proposal was accepted verbatim, else 0.
    pub label: u8,
}

impl TrainingExample {
    pub fn new(text: impl Into<String>, accepted: bool) -> Self {
        Self {
            text: text.into(),
            label: u8::from(accepted),
        }
    }
}

/// Outcome of one analysis pass, kept so feedback can adjust suggestions
/// without re-analysing the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub document_id: DocumentId,
    pub redline_id: DocumentId,
    pub findings: Findings,
    /// Validated suggestions before any feedback adjustment.
    pub suggestions: Suggestions,
}

impl ReviewRecord {
    /// Every suggestion key must point at a problematic finding from the same pass.
    pub fn is_consistent(&self) -> bool {
        self.suggestions.keys().all(|k| {
            self.findings
                .get(k)
                .is_some_and(|finding| finding.is_problematic)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(index: usize, problematic: bool) -> ClauseFinding {
        ClauseFinding {
            index,
            text: format!("clause {index}"),
            is_problematic: problematic,
            confidence: 0.9,
            context: vec![],
        }
    }

    fn suggestion(index: usize) -> Suggestion {
        Suggestion {
            index,
            clause: format!("clause {index}"),
            proposed: format!("Suggested revision: clause {index}"),
            confidence: 0.9,
            validation: None,
            needs_review: false,
            notes: vec![],
        }
    }

    #[test]
    fn record_json_roundtrip_keeps_integer_keys() {
        let record = ReviewRecord {
            document_id: "doc".into(),
            redline_id: "red".into(),
            findings: BTreeMap::from([(3, finding(3, true))]),
            suggestions: BTreeMap::from([(3, suggestion(3))]),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ReviewRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn record_consistency() {
        let mut record = ReviewRecord {
            document_id: "doc".into(),
            redline_id: "red".into(),
            findings: BTreeMap::from([(1, finding(1, true)), (2, finding(2, false))]),
            suggestions: BTreeMap::from([(1, suggestion(1))]),
        };
        assert!(record.is_consistent());

        record.suggestions.insert(2, suggestion(2));
        assert!(!record.is_consistent());
    }

    #[test]
    fn suggestion_notes_default_empty() {
        let json = r#"{"index":0,"clause":"c","proposed":"p","confidence":0.5}"#;
        let parsed: Suggestion = serde_json::from_str(json).unwrap();
        assert!(!parsed.needs_review);
        assert!(parsed.notes.is_empty());
    }

    #[test]
    fn training_example_label() {
        assert_eq!(TrainingExample::new("a", true).label, 1);
        assert_eq!(TrainingExample::new("a", false).label, 0);
    }
}
