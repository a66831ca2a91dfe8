//! Training-example derivation from original/redline/clean triples.
//!
//! Triples are aligned paragraph by paragraph. A paragraph whose clean text
//! differs from the original carries signal: label 1 when the clean text is
//! exactly the redline's proposal, 0 otherwise.

use tracing::{debug, info};

use crate::document::Document;
use crate::error::{Result, ReviewError};
use crate::review::TrainingExample;

/// Derive examples from index-paired document lists.
///
/// Fails with `MismatchedTrainingData` when the lists differ in length or a
/// triple's paragraph counts differ by more than `tolerance`.
pub fn derive_examples(
    originals: &[Document],
    redlines: &[Document],
    cleans: &[Document],
    tolerance: usize,
) -> Result<Vec<TrainingExample>> {
    if originals.len() != redlines.len() || originals.len() != cleans.len() {
        return Err(ReviewError::MismatchedTrainingData(format!(
            "document lists differ in length: {} original, {} redline, {} clean",
            originals.len(),
            redlines.len(),
            cleans.len()
        )));
    }

    let mut examples = Vec::new();
    for (i, ((original, redline), clean)) in originals.iter().zip(redlines).zip(cleans).enumerate() {
        let orig = original.non_blank_texts();
        let red = redline.suggested_texts();
        let cln = clean.non_blank_texts();

        check_tolerance(i, orig.len(), red.len(), cln.len(), tolerance)?;

        let derived = derive_from_paragraphs(&orig, &red, &cln);
        debug!(triple = i, examples = derived.len(), "derived training examples");
        examples.extend(derived);
    }

    info!(
        triples = originals.len(),
        examples = examples.len(),
        accepted = examples.iter().filter(|e| e.label == 1).count(),
        "training examples derived"
    );
    Ok(examples)
}

/// Positional zip of three paragraph sequences, stopping at the shortest.
pub fn derive_from_paragraphs(
    original: &[&str],
    redline: &[&str],
    clean: &[&str],
) -> Vec<TrainingExample> {
    original
        .iter()
        .zip(redline)
        .zip(clean)
        .filter(|((orig, _), clean)| orig != clean)
        .map(|((orig, red), clean)| TrainingExample::new(*orig, clean == red))
        .collect()
}

fn check_tolerance(
    triple: usize,
    original: usize,
    redline: usize,
    clean: usize,
    tolerance: usize,
) -> Result<()> {
    let max = original.max(redline).max(clean);
    let min = original.min(redline).min(clean);
    if max - min > tolerance {
        return Err(ReviewError::MismatchedTrainingData(format!(
            "triple {triple}: paragraph counts {original}/{redline}/{clean} \
             (original/redline/clean) differ by more than {tolerance}"
        )));
    }
    Ok(())
}
