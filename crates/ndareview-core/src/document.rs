//! Documents as ordered paragraph sequences.
//!
//! Paragraphs carry a [`ParagraphKind`] tag instead of styling, so derived
//! documents (redline, clean) can be read back without sniffing text for
//! markers. Derived paragraphs also remember the positional index of the
//! source paragraph they came from.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReviewError};

/// Opaque document identifier (UUID v4 string).
pub type DocumentId = String;

/// Role a paragraph plays in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphKind {
    /// Parsed from uploaded text; no review markup.
    Original,
    /// Original text struck out in a redline.
    Removed,
    /// Suggested replacement text in a redline.
    Proposed,
    /// Copied into a redline without change.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub text: String,
    pub kind: ParagraphKind,
    /// Index of the paragraph in the source document, for derived paragraphs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<usize>,
}

impl Paragraph {
    pub fn original(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ParagraphKind::Original,
            source: None,
        }
    }

    pub fn removed(text: impl Into<String>, source: usize) -> Self {
        Self {
            text: text.into(),
            kind: ParagraphKind::Removed,
            source: Some(source),
        }
    }

    pub fn proposed(text: impl Into<String>, source: usize) -> Self {
        Self {
            text: text.into(),
            kind: ParagraphKind::Proposed,
            source: Some(source),
        }
    }

    pub fn unchanged(text: impl Into<String>, source: usize) -> Self {
        Self {
            text: text.into(),
            kind: ParagraphKind::Unchanged,
            source: Some(source),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// An immutable, ordered sequence of paragraphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub paragraphs: Vec<Paragraph>,
    /// The document this one was synthesized from; `None` for uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<DocumentId>,
}

/// On-the-wire body of an uploaded JSON document. Any `id` is ignored.
#[derive(Deserialize)]
struct DocumentBody {
    paragraphs: Vec<Paragraph>,
}

impl Document {
    /// Create a document with a fresh ID.
    pub fn new(paragraphs: Vec<Paragraph>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            paragraphs,
            derived_from: None,
        }
    }

    /// A new document synthesized from `source`.
    pub fn derived(source: &Document, paragraphs: Vec<Paragraph>) -> Self {
        Self {
            derived_from: Some(source.id.clone()),
            ..Self::new(paragraphs)
        }
    }

    /// Uploaded by a user rather than produced by a review step.
    pub fn is_upload(&self) -> bool {
        self.derived_from.is_none()
    }

    /// One paragraph per line. Blank lines are kept as blank paragraphs.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines().map(Paragraph::original).collect())
    }

    /// Parse uploaded bytes: a JSON document body or plain UTF-8 text.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ReviewError::MalformedDocument(format!("invalid UTF-8: {e}")))?;

        if text.trim_start().starts_with('{') {
            let body: DocumentBody = serde_json::from_str(text)
                .map_err(|e| ReviewError::MalformedDocument(format!("invalid JSON: {e}")))?;
            return Ok(Self::new(body.paragraphs));
        }

        Ok(Self::from_text(text))
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Texts of all non-blank paragraphs, in order.
    pub fn non_blank_texts(&self) -> Vec<&str> {
        self.paragraphs
            .iter()
            .filter(|p| !p.is_blank())
            .map(|p| p.text.as_str())
            .collect()
    }

    /// Non-blank texts with every removed/proposed pair collapsed to the proposal.
    ///
    /// For a document without review markup this equals [`non_blank_texts`](Self::non_blank_texts).
    pub fn suggested_texts(&self) -> Vec<&str> {
        let proposed: HashSet<usize> = self
            .paragraphs
            .iter()
            .filter(|p| p.kind == ParagraphKind::Proposed)
            .filter_map(|p| p.source)
            .collect();

        self.paragraphs
            .iter()
            .filter(|p| {
                !(p.kind == ParagraphKind::Removed
                    && p.source.is_some_and(|s| proposed.contains(&s)))
            })
            .filter(|p| !p.is_blank())
            .map(|p| p.text.as_str())
            .collect()
    }

    /// Number of paragraphs carrying the given kind.
    pub fn count_kind(&self, kind: ParagraphKind) -> usize {
        self.paragraphs.iter().filter(|p| p.kind == kind).count()
    }

    /// Render as plain text: removed as `[-text-]`, proposed as `{+text+}`.
    pub fn render_text(&self) -> String {
        let lines: Vec<String> = self
            .paragraphs
            .iter()
            .map(|p| match p.kind {
                ParagraphKind::Removed => format!("[-{}-]", p.text),
                ParagraphKind::Proposed => format!("{{+{}+}}", p.text),
                ParagraphKind::Original | ParagraphKind::Unchanged => p.text.clone(),
            })
            .collect();
        lines.join("\n")
    }
}
