//! Training corpus discovery.
//!
//! A corpus directory has `original/`, `redline/` and `clean/` subdirectories.
//! Files pair up by base name: `<base>_original.*`, `<base>_redline.*`,
//! `<base>_clean.*`.

use std::path::{Path, PathBuf};

use ndareview_core::{Result, ReviewError};
use tracing::info;

#[derive(Debug, Default)]
pub struct Corpus {
    pub originals: Vec<PathBuf>,
    pub redlines: Vec<PathBuf>,
    pub cleans: Vec<PathBuf>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.originals.len()
    }
}

pub fn discover(dir: &Path) -> Result<Corpus> {
    let originals = list_kind(dir, "original")?;
    let redlines = list_kind(dir, "redline")?;
    let cleans = list_kind(dir, "clean")?;

    if originals.len() != redlines.len() || originals.len() != cleans.len() {
        return Err(ReviewError::MismatchedTrainingData(format!(
            "{} original, {} redline, {} clean documents in {}",
            originals.len(),
            redlines.len(),
            cleans.len(),
            dir.display()
        )));
    }

    let mut corpus = Corpus::default();
    for ((o, r), c) in originals.into_iter().zip(redlines).zip(cleans) {
        if o.0 != r.0 || o.0 != c.0 {
            return Err(ReviewError::MismatchedTrainingData(format!(
                "base names do not match: {}, {}, {}",
                o.1.display(),
                r.1.display(),
                c.1.display()
            )));
        }
        corpus.originals.push(o.1);
        corpus.redlines.push(r.1);
        corpus.cleans.push(c.1);
    }

    info!(dir = %dir.display(), triples = corpus.len(), "training corpus discovered");
    Ok(corpus)
}

/// (base name, path) for every file in `dir/kind`, sorted by base name.
fn list_kind(dir: &Path, kind: &str) -> Result<Vec<(String, PathBuf)>> {
    let sub = dir.join(kind);
    let entries = std::fs::read_dir(&sub).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ReviewError::NotFound(sub.display().to_string()),
        _ => e.into(),
    })?;

    let suffix = format!("_{kind}");
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let base = stem.strip_suffix(&suffix).unwrap_or(stem).to_string();
        files.push((base, path));
    }
    files.sort();
    Ok(files)
}
