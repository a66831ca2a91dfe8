//! Classification port: the opaque text → {0, 1} distribution capability.
//!
//! Backends implement [`ClassificationPort`]. Callers never hold a backend
//! directly; they go through a [`ModelHandle`], which hands out `Arc`
//! snapshots so a reload never changes the weights under an in-flight call.
//! [`PortScorer`] adds truncation policy and a timeout on top of a handle and
//! exposes the two distinct uses of the port: clause risk and feedback
//! sentiment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ndareview_core::{Result, ReviewConfig, ReviewError, Truncation};
use tracing::{debug, info};

/// Probability distribution over labels {0, 1}.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelDistribution {
    probs: [f32; 2],
}

impl LabelDistribution {
    /// Build from unnormalised non-negative weights.
    pub fn new(p0: f32, p1: f32) -> Self {
        let p0 = p0.max(0.0);
        let p1 = p1.max(0.0);
        let sum = p0 + p1;
        if sum > 0.0 {
            Self {
                probs: [p0 / sum, p1 / sum],
            }
        } else {
            Self { probs: [0.5, 0.5] }
        }
    }

    /// Softmax over two logits.
    pub fn from_logits(logits: [f32; 2]) -> Self {
        let max = logits[0].max(logits[1]);
        let e0 = (logits[0] - max).exp();
        let e1 = (logits[1] - max).exp();
        Self::new(e0, e1)
    }

    /// P(label = 1): problematic for risk, positive for sentiment.
    pub fn positive(&self) -> f32 {
        self.probs[1]
    }

    pub fn negative(&self) -> f32 {
        self.probs[0]
    }

    /// Most probable label; ties go to 0.
    pub fn label(&self) -> u8 {
        u8::from(self.probs[1] > self.probs[0])
    }
}

#[async_trait]
pub trait ClassificationPort: Send + Sync {
    /// Backend name recorded in logs.
    fn name(&self) -> &str;

    /// Score already-truncated text. `max_length` is the token budget, for
    /// backends that tokenise more finely than whitespace.
    async fn score(&self, text: &str, max_length: usize) -> Result<LabelDistribution>;
}

/// Shared, swappable reference to the active classifier weights.
///
/// Cloning a handle shares the slot; [`swap`](Self::swap) on one clone is seen
/// by all of them.
#[derive(Clone, Default)]
pub struct ModelHandle {
    slot: Arc<RwLock<Option<Arc<dyn ClassificationPort>>>>,
    version: Arc<AtomicU64>,
}

impl ModelHandle {
    /// A handle with no weights loaded; scoring fails with `ModelUnavailable`.
    pub fn unloaded() -> Self {
        Self::default()
    }

    pub fn new(port: Arc<dyn ClassificationPort>) -> Self {
        let handle = Self::default();
        handle.swap(port);
        handle
    }

    /// Consistent snapshot of the active weights.
    pub fn snapshot(&self) -> Result<Arc<dyn ClassificationPort>> {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ReviewError::ModelUnavailable("no classifier weights loaded".into()))
    }

    /// Replace the active weights. In-flight calls finish on their snapshot.
    pub fn swap(&self, port: Arc<dyn ClassificationPort>) -> Option<Arc<dyn ClassificationPort>> {
        let name = port.name().to_string();
        let previous = self
            .slot
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(port);
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(model = %name, version, "classifier weights swapped");
        previous
    }

    /// A new, unshared handle over the current weights.
    pub fn pinned(&self) -> Self {
        let current = self.slot.read().unwrap_or_else(|e| e.into_inner()).clone();
        Self {
            slot: Arc::new(RwLock::new(current)),
            version: Arc::new(AtomicU64::new(self.version())),
        }
    }

    pub fn unload(&self) {
        self.slot.write().unwrap_or_else(|e| e.into_inner()).take();
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Incremented on every swap or unload.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Apply the truncation policy: keep the leading `max_length` whitespace tokens.
pub fn prepare_input(text: &str, max_length: usize, truncation: Truncation) -> Result<&str> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() <= max_length {
        return Ok(text);
    }
    match truncation {
        Truncation::Reject => Err(ReviewError::InputTooLong {
            tokens: tokens.len(),
            max_length,
        }),
        Truncation::Truncate => {
            let Some(last) = max_length.checked_sub(1).map(|i| tokens[i]) else {
                return Ok("");
            };
            // Tokens are subslices of `text`; cut right after the last kept one.
            let end = last.as_ptr() as usize - text.as_ptr() as usize + last.len();
            Ok(&text[..end])
        }
    }
}

/// Clause risk: P(problematic).
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    async fn risk(&self, text: &str) -> Result<f32>;
}

/// Feedback sentiment: P(positive).
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn sentiment(&self, text: &str) -> Result<f32>;
}

/// Truncating, time-bounded scoring through a [`ModelHandle`].
#[derive(Clone)]
pub struct PortScorer {
    handle: ModelHandle,
    max_length: usize,
    truncation: Truncation,
    timeout: Duration,
}

impl PortScorer {
    pub fn new(handle: ModelHandle, config: &ReviewConfig) -> Self {
        Self {
            handle,
            max_length: config.max_length,
            truncation: config.truncation,
            timeout: config.inference_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub async fn distribution(&self, text: &str) -> Result<LabelDistribution> {
        let input = prepare_input(text, self.max_length, self.truncation)?;
        let port = self.handle.snapshot()?;
        debug!(model = port.name(), chars = input.len(), "scoring text");
        tokio::time::timeout(self.timeout, port.score(input, self.max_length))
            .await
            .map_err(|_| ReviewError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl RiskClassifier for PortScorer {
    async fn risk(&self, text: &str) -> Result<f32> {
        Ok(self.distribution(text).await?.positive())
    }
}

#[async_trait]
impl SentimentClassifier for PortScorer {
    async fn sentiment(&self, text: &str) -> Result<f32> {
        Ok(self.distribution(text).await?.positive())
    }
}
