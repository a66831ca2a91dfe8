//! Data directory layout and service wiring.
//!
//! ```text
//! <data>/documents/<id>.json     documents (uploads, redlines, cleans)
//! <data>/reviews/<id>.json       review records
//! <data>/feedback/<id>.jsonl     feedback log (feedback.duckdb with `duckdb`)
//! <data>/models.json             active model directory per slot
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ndareview_ai::{ModelSet, ModelTarget, ReviewService};
use ndareview_core::{ReviewConfig, TextEncoder};
use ndareview_store::{DocumentStore, FeedbackLog, FsDocumentStore, MemoryIndex, SimilaritySearch};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const ACTIVE_MODELS_FILE: &str = "models.json";

/// Model directories loaded at startup, per slot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ActiveModels {
    pub risk: Option<PathBuf>,
    pub validation: Option<PathBuf>,
    pub sentiment: Option<PathBuf>,
}

impl ActiveModels {
    pub fn read(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(ACTIVE_MODELS_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn write(&self, data_dir: &Path) -> anyhow::Result<()> {
        let path = data_dir.join(ACTIVE_MODELS_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))
    }

    pub fn set(&mut self, target: ModelTarget, dir: PathBuf) {
        match target {
            ModelTarget::All => {
                self.risk = Some(dir.clone());
                self.validation = Some(dir.clone());
                self.sentiment = Some(dir);
            }
            ModelTarget::Risk => self.risk = Some(dir),
            ModelTarget::Validation => self.validation = Some(dir),
            ModelTarget::Sentiment => self.sentiment = Some(dir),
        }
    }

    fn slots(&self) -> [(ModelTarget, Option<&PathBuf>); 3] {
        [
            (ModelTarget::Risk, self.risk.as_ref()),
            (ModelTarget::Validation, self.validation.as_ref()),
            (ModelTarget::Sentiment, self.sentiment.as_ref()),
        ]
    }
}

/// Everything needed to open the service.
pub struct Options {
    pub data_dir: PathBuf,
    pub config: Option<PathBuf>,
    pub encoder_dir: Option<PathBuf>,
    pub classifier_url: Option<String>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<ReviewConfig> {
    match path {
        Some(path) => ReviewConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ReviewConfig::default()),
    }
}

fn encoder(options: &Options, config: &ReviewConfig) -> anyhow::Result<Arc<dyn TextEncoder>> {
    match &options.encoder_dir {
        #[cfg(feature = "onnx")]
        Some(dir) => Ok(Arc::new(
            ndareview_ai::onnx::OnnxEmbedder::load(dir, config.max_length)
                .context("loading ONNX sentence encoder")?,
        )),
        #[cfg(not(feature = "onnx"))]
        Some(_) => {
            let _ = config;
            anyhow::bail!("--encoder-dir requires the `onnx` feature")
        }
        None => Ok(Arc::new(ndareview_core::HashingEncoder::default())),
    }
}

async fn feedback_log(data_dir: &Path) -> anyhow::Result<Arc<dyn FeedbackLog>> {
    #[cfg(feature = "duckdb")]
    {
        let log = ndareview_store::DuckFeedbackLog::open_persistent(&data_dir.join("feedback.duckdb"))
            .context("opening feedback database")?;
        Ok(Arc::new(log))
    }
    #[cfg(not(feature = "duckdb"))]
    {
        let log = ndareview_store::FsFeedbackLog::open(&data_dir.join("feedback"))
            .await
            .context("opening feedback log")?;
        Ok(Arc::new(log))
    }
}

fn remote_models(url: &str) -> anyhow::Result<ModelSet> {
    #[cfg(feature = "http")]
    {
        info!(url, "using remote classifier");
        Ok(ModelSet::shared(Arc::new(
            ndareview_ai::remote::HttpClassifier::new(url),
        )))
    }
    #[cfg(not(feature = "http"))]
    {
        let _ = url;
        anyhow::bail!("--classifier-url requires the `http` feature")
    }
}

/// Re-index stored uploads, the same set `upload` indexes during a session.
async fn rebuild_memory(
    documents: &dyn DocumentStore,
    memory: &MemoryIndex,
) -> anyhow::Result<usize> {
    let mut indexed = 0;
    for id in documents.list().await? {
        let document = documents.get(&id).await?;
        if !document.is_upload() {
            continue;
        }
        memory.add(&id, &document.non_blank_texts().join("\n")).await?;
        indexed += 1;
    }
    Ok(indexed)
}

pub async fn open(options: &Options) -> anyhow::Result<ReviewService> {
    let config = load_config(options.config.as_deref())?;
    std::fs::create_dir_all(&options.data_dir)
        .with_context(|| format!("creating {}", options.data_dir.display()))?;

    let documents = Arc::new(
        FsDocumentStore::open(&options.data_dir)
            .await
            .context("opening document store")?,
    );
    let feedback = feedback_log(&options.data_dir).await?;
    let encoder = encoder(options, &config)?;
    let memory = Arc::new(MemoryIndex::new(Arc::clone(&encoder)));
    let indexed = rebuild_memory(documents.as_ref(), &memory).await?;

    let models = match &options.classifier_url {
        Some(url) => remote_models(url)?,
        None => ModelSet::unloaded(),
    };

    let service = ReviewService::new(config, documents, feedback, memory, encoder, models);

    if options.classifier_url.is_none() {
        let active = ActiveModels::read(&options.data_dir)?;
        for (target, dir) in active.slots() {
            let Some(dir) = dir else { continue };
            if let Err(e) = service.load_model(dir, target) {
                warn!(dir = %dir.display(), ?target, error = %e, "active model failed to load");
            }
        }
    }

    info!(data_dir = %options.data_dir.display(), indexed, "review service ready");
    Ok(service)
}
