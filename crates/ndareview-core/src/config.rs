//! Review configuration, loadable from an optional JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Risk terms flagged by the clause analyzer (matched case-insensitively).
pub const DEFAULT_RISK_PATTERNS: &[&str] = &[
    "confidentiality",
    "non-disclosure",
    "intellectual property",
    "termination",
    "liability",
    "warranty",
    "indemnification",
];

/// What to do with input longer than the model's maximum length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// Keep the leading tokens, drop the rest.
    #[default]
    Truncate,
    /// Fail with `InputTooLong`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub risk_patterns: Vec<String>,
    /// Maximum classifier input length, in tokens.
    pub max_length: usize,
    pub truncation: Truncation,
    /// Validation scores at or below this flag a suggestion for review.
    pub validation_threshold: f32,
    /// Sentiment below this counts as negative feedback.
    pub positive_sentiment: f32,
    pub suggestion_marker: String,
    pub inference_timeout_secs: u64,
    /// Allowed paragraph-count difference within a training triple.
    pub paragraph_tolerance: usize,
    /// Share of derived examples held out for evaluation.
    pub holdout_fraction: f32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            risk_patterns: DEFAULT_RISK_PATTERNS.iter().map(|s| s.to_string()).collect(),
            max_length: 512,
            truncation: Truncation::Truncate,
            validation_threshold: 0.7,
            positive_sentiment: 0.5,
            suggestion_marker: "Suggested revision: ".to_string(),
            inference_timeout_secs: 30,
            paragraph_tolerance: 0,
            holdout_fraction: 0.2,
        }
    }
}

impl ReviewConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        info!(path = %path.display(), patterns = config.risk_patterns.len(), "loaded review config");
        Ok(config)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Risk patterns contained in `text`, case-insensitively.
    pub fn matched_patterns<'a>(&'a self, text: &str) -> Vec<&'a str> {
        let lower = text.to_lowercase();
        self.risk_patterns
            .iter()
            .filter(|p| lower.contains(&p.to_lowercase()))
            .map(|p| p.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReviewConfig::default();
        assert_eq!(config.max_length, 512);
        assert_eq!(config.validation_threshold, 0.7);
        assert_eq!(config.truncation, Truncation::Truncate);
        assert_eq!(config.risk_patterns.len(), 7);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ReviewConfig =
            serde_json::from_str(r#"{"truncation": "reject", "max_length": 64}"#).unwrap();
        assert_eq!(config.truncation, Truncation::Reject);
        assert_eq!(config.max_length, 64);
        assert_eq!(config.validation_threshold, 0.7);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("review.json");
        std::fs::write(&path, r#"{"risk_patterns": ["exclusivity"]}"#).unwrap();

        let config = ReviewConfig::load(&path).unwrap();
        assert_eq!(config.risk_patterns, vec!["exclusivity"]);
    }

    #[test]
    fn matched_patterns_case_insensitive() {
        let config = ReviewConfig::default();
        let matched =
            config.matched_patterns("LIABILITY is capped; Intellectual Property stays with Discloser.");
        assert_eq!(matched, vec!["intellectual property", "liability"]);
        assert!(config.matched_patterns("The parties agree.").is_empty());
    }
}
