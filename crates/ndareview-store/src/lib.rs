//! Storage layer: documents and review records, the feedback log, and NDA similarity search.

mod error;
pub use error::StoreError;

pub mod documents;
pub mod feedback;
pub mod similarity;

pub use documents::{DocumentStore, FsDocumentStore, MemoryDocumentStore, read_document_file};
pub use feedback::{FeedbackLog, FeedbackStats, FsFeedbackLog, MemoryFeedbackLog};
pub use similarity::{MemoryIndex, SimilarDocument, SimilaritySearch};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckFeedbackLog;
