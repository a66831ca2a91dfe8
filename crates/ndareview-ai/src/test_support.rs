//! Deterministic classification stubs for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ndareview_core::{Result, ReviewError};

use crate::port::{ClassificationPort, LabelDistribution};

/// Returns the same P(1) for every input and records what it saw.
pub struct FixedClassifier {
    positive: f32,
    seen: Mutex<Vec<String>>,
}

impl FixedClassifier {
    pub fn new(positive: f32) -> Self {
        Self {
            positive,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClassificationPort for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn score(&self, text: &str, _max_length: usize) -> Result<LabelDistribution> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(LabelDistribution::new(1.0 - self.positive, self.positive))
    }
}

/// P(1) looked up by substring; first rule that matches wins.
pub struct RuleClassifier {
    rules: Vec<(String, f32)>,
    fallback: f32,
}

impl RuleClassifier {
    pub fn new(rules: &[(&str, f32)], fallback: f32) -> Self {
        Self {
            rules: rules.iter().map(|(k, p)| (k.to_string(), *p)).collect(),
            fallback,
        }
    }
}

#[async_trait]
impl ClassificationPort for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn score(&self, text: &str, _max_length: usize) -> Result<LabelDistribution> {
        let p = self
            .rules
            .iter()
            .find(|(key, _)| text.contains(key.as_str()))
            .map(|(_, p)| *p)
            .unwrap_or(self.fallback);
        Ok(LabelDistribution::new(1.0 - p, p))
    }
}

/// Sleeps before answering.
pub struct SlowClassifier {
    positive: f32,
    delay: Duration,
}

impl SlowClassifier {
    pub fn new(positive: f32, delay: Duration) -> Self {
        Self { positive, delay }
    }
}

#[async_trait]
impl ClassificationPort for SlowClassifier {
    fn name(&self) -> &str {
        "slow"
    }

    async fn score(&self, _text: &str, _max_length: usize) -> Result<LabelDistribution> {
        tokio::time::sleep(self.delay).await;
        Ok(LabelDistribution::new(1.0 - self.positive, self.positive))
    }
}

/// Fails on any text containing one of the given markers.
pub struct FailingClassifier {
    poison: Vec<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FailingClassifier {
    pub fn new(poison: &[&str]) -> Self {
        Self {
            poison: poison.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ClassificationPort for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn score(&self, text: &str, _max_length: usize) -> Result<LabelDistribution> {
        *self.calls.lock().unwrap().entry(text.to_string()).or_default() += 1;
        if self.poison.iter().any(|p| text.contains(p.as_str())) {
            return Err(ReviewError::ModelUnavailable("inference backend unreachable".into()));
        }
        Ok(LabelDistribution::new(0.2, 0.8))
    }
}
