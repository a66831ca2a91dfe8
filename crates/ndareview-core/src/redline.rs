//! Redline and clean document synthesis.
//!
//! Both transforms are pure: they read a document and return a new one with a
//! fresh ID. The paragraph kind tags written by [`synthesize_redline`] are the
//! only markers [`synthesize_clean`] looks at.

use std::collections::BTreeSet;

use crate::document::{Document, Paragraph, ParagraphKind};
use crate::review::Suggestions;

/// Insert a removed/proposed pair in place of every suggested paragraph.
///
/// The output holds `document.len() + suggestions matched` paragraphs and keeps
/// every other paragraph in its original relative order.
pub fn synthesize_redline(document: &Document, suggestions: &Suggestions) -> Document {
    let mut paragraphs = Vec::with_capacity(document.len() + suggestions.len());

    for (index, paragraph) in document.paragraphs.iter().enumerate() {
        match suggestions.get(&index) {
            Some(suggestion) => {
                paragraphs.push(Paragraph::removed(paragraph.text.clone(), index));
                paragraphs.push(Paragraph::proposed(suggestion.proposed.clone(), index));
            }
            None => paragraphs.push(Paragraph::unchanged(paragraph.text.clone(), index)),
        }
    }

    Document::derived(document, paragraphs)
}

/// Which proposals in a redline the reviewer accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    All,
    /// Source paragraph indices whose proposals were accepted.
    Only(BTreeSet<usize>),
}

impl Acceptance {
    pub fn none() -> Self {
        Self::Only(BTreeSet::new())
    }

    fn accepts(&self, source: Option<usize>) -> bool {
        match self {
            Self::All => true,
            Self::Only(accepted) => source.is_some_and(|s| accepted.contains(&s)),
        }
    }
}

/// Reduce a redline to its final text.
///
/// Accepted proposals replace their removed originals; rejected proposals are
/// dropped and the removed original is restored. A removed paragraph with no
/// proposal for its source is always kept. Unmarked paragraphs are copied in
/// order.
pub fn synthesize_clean(redline: &Document, acceptance: &Acceptance) -> Document {
    let proposed: BTreeSet<Option<usize>> = redline
        .paragraphs
        .iter()
        .filter(|p| p.kind == ParagraphKind::Proposed)
        .map(|p| p.source)
        .collect();

    let paragraphs = redline
        .paragraphs
        .iter()
        .filter(|p| match p.kind {
            ParagraphKind::Proposed => acceptance.accepts(p.source),
            ParagraphKind::Removed => {
                !(acceptance.accepts(p.source) && proposed.contains(&p.source))
            }
            ParagraphKind::Original | ParagraphKind::Unchanged => true,
        })
        .map(|p| Paragraph::original(p.text.clone()))
        .collect();

    Document::derived(redline, paragraphs)
}
