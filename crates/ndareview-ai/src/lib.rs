//! Clause review pipeline and classification backends.
//!
//! Every model call goes through a [`ModelHandle`]; the centroid head is
//! always available, ONNX (`onnx` feature) and remote HTTP (`http` feature)
//! backends are optional.

pub mod analyzer;
pub mod centroid;
pub mod feedback;
pub mod pipeline;
pub mod port;
pub mod suggest;
pub mod trainer;

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "http")]
pub mod remote;

#[cfg(test)]
mod test_support;

pub use analyzer::ClauseAnalyzer;
pub use centroid::CentroidClassifier;
pub use feedback::{FeedbackInterpreter, SuggestionAdjuster, extract_key_points};
pub use pipeline::{FeedbackOutcome, ModelSet, ModelTarget, ReviewOutcome, ReviewService};
pub use port::{
    ClassificationPort, LabelDistribution, ModelHandle, PortScorer, RiskClassifier,
    SentimentClassifier,
};
pub use suggest::{MarkerWriter, SuggestionValidator, SuggestionWriter, generate_suggestions};
pub use trainer::{Evaluation, Trainer, TrainingMetadata, TrainingReport, load_model};
