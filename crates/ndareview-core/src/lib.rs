pub mod config;
pub mod derive;
pub mod document;
pub mod encoder;
pub mod error;
pub mod redline;
pub mod review;
pub mod schema;

pub use config::{ReviewConfig, Truncation};
pub use document::{Document, DocumentId, Paragraph, ParagraphKind};
pub use encoder::{HashingEncoder, TextEncoder};
pub use error::{Result, ReviewError};
pub use redline::{Acceptance, synthesize_clean, synthesize_redline};
pub use review::{
    ClauseFinding, Feedback, Findings, ReviewRecord, Suggestion, Suggestions, TrainingExample,
};
