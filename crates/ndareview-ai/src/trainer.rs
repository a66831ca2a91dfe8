//! Training, evaluation, and model artifact persistence.
//!
//! An artifact is a directory. A trained centroid head writes `head.json`,
//! `training_metadata.json` and `training_examples.arrow` into it. A directory
//! holding `model.onnx` and `tokenizer.json` is loaded as an ONNX sequence
//! classifier instead (`onnx` feature).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndareview_core::schema::training;
use ndareview_core::{Result, ReviewConfig, ReviewError, TextEncoder, TrainingExample};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::centroid::{CentroidClassifier, HEAD_FILE};
use crate::port::ClassificationPort;

pub const METADATA_FILE: &str = "training_metadata.json";
pub const EXAMPLES_FILE: &str = "training_examples.arrow";

/// Held-out accuracy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f32,
    pub num_samples: usize,
    pub correct_predictions: usize,
}

impl Evaluation {
    fn from_counts(correct: usize, total: usize) -> Self {
        Self {
            accuracy: if total == 0 {
                0.0
            } else {
                correct as f32 / total as f32
            },
            num_samples: total,
            correct_predictions: correct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub training_date: DateTime<Utc>,
    pub num_samples: usize,
    pub model_name: String,
    pub encoder: String,
    pub holdout_fraction: f32,
    pub evaluation: Evaluation,
}

impl TrainingMetadata {
    pub fn read(dir: &Path) -> Result<Self> {
        let bytes = std::fs::read(dir.join(METADATA_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model_dir: PathBuf,
    pub num_samples: usize,
    pub num_train: usize,
    pub evaluation: Evaluation,
}

/// Split off a held-out tail. With two or more examples and a positive
/// fraction, at least one is held out and at least one is kept for training.
pub fn holdout_split(examples: &[TrainingExample], fraction: f32) -> (&[TrainingExample], &[TrainingExample]) {
    let n = examples.len();
    if n < 2 || fraction <= 0.0 {
        return (examples, &[]);
    }
    let held = ((n as f32 * fraction).ceil() as usize).clamp(1, n - 1);
    examples.split_at(n - held)
}

#[derive(Clone)]
pub struct Trainer {
    encoder: Arc<dyn TextEncoder>,
    holdout_fraction: f32,
}

impl Trainer {
    pub fn new(encoder: Arc<dyn TextEncoder>, holdout_fraction: f32) -> Self {
        Self {
            encoder,
            holdout_fraction,
        }
    }

    /// Fit a head on the training split, evaluate on the held-out split, and
    /// persist everything under `output_dir`.
    pub fn train(&self, examples: &[TrainingExample], output_dir: &Path) -> Result<TrainingReport> {
        let (train, holdout) = holdout_split(examples, self.holdout_fraction);
        info!(
            total = examples.len(),
            train = train.len(),
            holdout = holdout.len(),
            "training classification head"
        );

        let head = CentroidClassifier::fit(Arc::clone(&self.encoder), train)?;

        let mut correct = 0;
        for example in holdout {
            if head.classify_text(&example.text)?.label() == example.label {
                correct += 1;
            }
        }
        let evaluation = Evaluation::from_counts(correct, holdout.len());

        std::fs::create_dir_all(output_dir)?;
        head.save(output_dir)?;
        training::write_examples(&output_dir.join(EXAMPLES_FILE), examples)?;

        let metadata = TrainingMetadata {
            training_date: Utc::now(),
            num_samples: examples.len(),
            model_name: output_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            encoder: self.encoder.name().to_string(),
            holdout_fraction: self.holdout_fraction,
            evaluation,
        };
        std::fs::write(
            output_dir.join(METADATA_FILE),
            serde_json::to_vec_pretty(&metadata)?,
        )?;

        info!(
            dir = %output_dir.display(),
            accuracy = evaluation.accuracy,
            correct = evaluation.correct_predictions,
            "model artifact written"
        );
        Ok(TrainingReport {
            model_dir: output_dir.to_path_buf(),
            num_samples: examples.len(),
            num_train: train.len(),
            evaluation,
        })
    }
}

/// Accuracy of any classification port on labelled examples.
pub async fn evaluate(
    port: &dyn ClassificationPort,
    examples: &[TrainingExample],
    max_length: usize,
) -> Result<Evaluation> {
    let mut correct = 0;
    for example in examples {
        if port.score(&example.text, max_length).await?.label() == example.label {
            correct += 1;
        }
    }
    Ok(Evaluation::from_counts(correct, examples.len()))
}

/// Load the classifier stored in `dir`.
///
/// Centroid heads must have been trained with the same encoder.
pub fn load_model(
    dir: &Path,
    config: &ReviewConfig,
    encoder: Arc<dyn TextEncoder>,
) -> Result<Arc<dyn ClassificationPort>> {
    if !dir.is_dir() {
        return Err(ReviewError::NotFound(format!("model directory {}", dir.display())));
    }

    #[cfg(feature = "onnx")]
    if crate::onnx::is_model_dir(dir) {
        let classifier = crate::onnx::OnnxClassifier::load(dir, config.max_length, config.truncation)
            .map_err(|e| ReviewError::ModelUnavailable(format!("{e:#}")))?;
        info!(dir = %dir.display(), "loaded onnx classifier");
        return Ok(Arc::new(classifier));
    }
    #[cfg(not(feature = "onnx"))]
    let _ = config;

    if dir.join(HEAD_FILE).exists() {
        let artifact = CentroidClassifier::read_artifact(dir)?;
        let head = CentroidClassifier::from_artifact(encoder, artifact)?;
        info!(dir = %dir.display(), encoder = %head.artifact().encoder, "loaded centroid head");
        return Ok(Arc::new(head));
    }

    Err(ReviewError::NotFound(format!(
        "no model artifact in {}",
        dir.display()
    )))
}
