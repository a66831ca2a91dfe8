//! Centroid classification head over a [`TextEncoder`].
//!
//! Training averages the encoded vectors of each label into a centroid.
//! Scoring compares a text's vector to both centroids by cosine similarity
//! and turns the two similarities into a distribution with a temperature
//! softmax. The head is small enough to persist as JSON next to the
//! training metadata.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ndareview_core::encoder::{cosine_sim, normalize};
use ndareview_core::{Result, ReviewError, TextEncoder, TrainingExample};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::port::{ClassificationPort, LabelDistribution};

/// File name of a persisted head inside a model directory.
pub const HEAD_FILE: &str = "head.json";

/// Scale applied to cosine similarities before the softmax.
pub const DEFAULT_TEMPERATURE: f32 = 10.0;

const ENCODE_BATCH_SIZE: usize = 64;

/// Serialized form of a trained head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidArtifact {
    pub encoder: String,
    pub dim: usize,
    pub temperature: f32,
    /// Centroid for label 0 then label 1. Zero vector when a label had no examples.
    pub centroids: [Vec<f32>; 2],
    pub label_counts: [usize; 2],
}

pub struct CentroidClassifier {
    encoder: Arc<dyn TextEncoder>,
    artifact: CentroidArtifact,
}

impl CentroidClassifier {
    /// Fit centroids from labelled examples.
    pub fn fit(encoder: Arc<dyn TextEncoder>, examples: &[TrainingExample]) -> Result<Self> {
        if examples.is_empty() {
            return Err(ReviewError::MismatchedTrainingData(
                "no training examples to fit".into(),
            ));
        }

        let dim = encoder.dim();
        let mut sums = [vec![0.0f32; dim], vec![0.0f32; dim]];
        let mut counts = [0usize; 2];

        for chunk in examples.chunks(ENCODE_BATCH_SIZE) {
            let texts: Vec<&str> = chunk.iter().map(|e| e.text.as_str()).collect();
            let vectors = encoder.encode_batch(&texts)?;
            for (example, vector) in chunk.iter().zip(vectors) {
                let label = usize::from(example.label.min(1));
                for (acc, x) in sums[label].iter_mut().zip(&vector) {
                    *acc += x;
                }
                counts[label] += 1;
            }
            debug!(encoded = chunk.len(), "encoded training batch");
        }

        for (sum, &count) in sums.iter_mut().zip(&counts) {
            if count > 0 {
                for x in sum.iter_mut() {
                    *x /= count as f32;
                }
                normalize(sum);
            }
        }

        info!(
            encoder = encoder.name(),
            rejected = counts[0],
            accepted = counts[1],
            "fitted centroid head"
        );
        let artifact = CentroidArtifact {
            encoder: encoder.name().to_string(),
            dim,
            temperature: DEFAULT_TEMPERATURE,
            centroids: sums,
            label_counts: counts,
        };
        Ok(Self { encoder, artifact })
    }

    /// Rebuild a head from its artifact and a matching encoder.
    pub fn from_artifact(encoder: Arc<dyn TextEncoder>, artifact: CentroidArtifact) -> Result<Self> {
        if encoder.name() != artifact.encoder || encoder.dim() != artifact.dim {
            return Err(ReviewError::ModelUnavailable(format!(
                "head was trained with {} ({}d), encoder is {} ({}d)",
                artifact.encoder,
                artifact.dim,
                encoder.name(),
                encoder.dim()
            )));
        }
        Ok(Self { encoder, artifact })
    }

    pub fn artifact(&self) -> &CentroidArtifact {
        &self.artifact
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.artifact)?;
        std::fs::write(dir.join(HEAD_FILE), json)?;
        Ok(())
    }

    pub fn read_artifact(dir: &Path) -> Result<CentroidArtifact> {
        let path = dir.join(HEAD_FILE);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ReviewError::NotFound(format!("model head {}", path.display()))
            }
            _ => e.into(),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Distribution for an already-encoded vector.
    pub fn classify_vector(&self, vector: &[f32]) -> LabelDistribution {
        let t = self.artifact.temperature;
        let sims = [
            similarity(&self.artifact.centroids[0], vector),
            similarity(&self.artifact.centroids[1], vector),
        ];
        LabelDistribution::from_logits([sims[0] * t, sims[1] * t])
    }

    /// Synchronous scoring used by the trainer's evaluation pass.
    pub fn classify_text(&self, text: &str) -> Result<LabelDistribution> {
        Ok(self.classify_vector(&self.encoder.encode(text)?))
    }
}

fn similarity(centroid: &[f32], vector: &[f32]) -> f32 {
    if centroid.iter().all(|x| *x == 0.0) {
        0.0
    } else {
        cosine_sim(centroid, vector)
    }
}

#[async_trait]
impl ClassificationPort for CentroidClassifier {
    fn name(&self) -> &str {
        "centroid"
    }

    async fn score(&self, text: &str, _max_length: usize) -> Result<LabelDistribution> {
        self.classify_text(text)
    }
}
