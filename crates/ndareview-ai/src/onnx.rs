//! ONNX Runtime backends: a sequence classifier and a sentence encoder.
//!
//! Both read a model directory containing `model.onnx` and `tokenizer.json`.
//! The classifier expects `[batch, 2]` logits; the encoder expects token
//! embeddings `[batch, seq, dim]` and mean-pools them.
//!
//! The token budget is counted in subword tokens. Under [`Truncation::Reject`]
//! the classifier's tokenizer keeps every token and an over-long input fails
//! with `InputTooLong` instead of being cut.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndareview_core::encoder::normalize;
use ndareview_core::{Result, ReviewError, TextEncoder, Truncation};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};
use tracing::info;

use crate::port::{ClassificationPort, LabelDistribution};

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Whether `dir` holds an ONNX model and its tokenizer.
pub fn is_model_dir(dir: &Path) -> bool {
    dir.join(MODEL_FILE).exists() && dir.join(TOKENIZER_FILE).exists()
}

fn unavailable(e: anyhow::Error) -> ReviewError {
    ReviewError::ModelUnavailable(format!("{e:#}"))
}

fn model_name(dir: &Path) -> String {
    let stem = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    format!("onnx:{stem}")
}

/// Raw model output for one batch: (shape, data, attention mask, padded length).
struct BatchOutput {
    shape: Vec<i64>,
    data: Vec<f32>,
    attention_mask: Vec<i64>,
    seq_len: usize,
}

/// Tokenizer with batch padding, read from `tokenizer.json`.
fn load_tokenizer(path: &Path) -> anyhow::Result<Tokenizer> {
    let mut tokenizer =
        Tokenizer::from_file(path).map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
    tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));
    Ok(tokenizer)
}

/// Truncate to `max_length` subword tokens, or keep them all under `Reject`.
fn set_budget(tokenizer: &mut Tokenizer, max_length: usize, truncation: Truncation) -> anyhow::Result<()> {
    let params = match truncation {
        Truncation::Truncate => Some(tokenizers::TruncationParams {
            max_length,
            ..Default::default()
        }),
        Truncation::Reject => None,
    };
    tokenizer
        .with_truncation(params)
        .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
    Ok(())
}

fn encode(
    tokenizer: &Tokenizer,
    texts: &[&str],
    max_length: usize,
    truncation: Truncation,
) -> Result<Vec<Encoding>> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| ReviewError::ModelUnavailable(format!("tokenize: {e}")))?;
    if truncation == Truncation::Reject
        && let Some(tokens) = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .find(|&n| n > max_length)
    {
        return Err(ReviewError::InputTooLong { tokens, max_length });
    }
    Ok(encodings)
}

struct OnnxModel {
    session: Session,
    tokenizer: Tokenizer,
    uses_type_ids: bool,
    max_length: usize,
    truncation: Truncation,
}

impl OnnxModel {
    fn load(model_dir: &Path, max_length: usize, truncation: Truncation) -> anyhow::Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        anyhow::ensure!(model_path.exists(), "{MODEL_FILE} not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "{TOKENIZER_FILE} not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        // DistilBERT-style exports take no segment ids.
        let uses_type_ids = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        let mut tokenizer = load_tokenizer(&tokenizer_path)?;
        set_budget(&mut tokenizer, max_length, truncation)?;

        info!(model = %model_path.display(), uses_type_ids, ?truncation, "loaded onnx model");
        Ok(Self {
            session,
            tokenizer,
            uses_type_ids,
            max_length,
            truncation,
        })
    }

    fn set_max_length(&mut self, max_length: usize) -> anyhow::Result<()> {
        if max_length == self.max_length {
            return Ok(());
        }
        set_budget(&mut self.tokenizer, max_length, self.truncation)?;
        self.max_length = max_length;
        Ok(())
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Encoding>> {
        encode(&self.tokenizer, texts, self.max_length, self.truncation)
    }

    fn run(&mut self, encodings: &[Encoding]) -> anyhow::Result<BatchOutput> {
        let batch_size = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let offset = i * seq_len;
            let ids = encoding.get_ids().iter().zip(encoding.get_attention_mask());
            for (j, (&id, &mask)) in ids.enumerate() {
                input_ids[offset + j] = id as i64;
                attention_mask[offset + j] = mask as i64;
            }
            for (j, &tid) in encoding.get_type_ids().iter().enumerate() {
                token_type_ids[offset + j] = tid as i64;
            }
        }

        let shape = [batch_size as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))?;

        let outputs = if self.uses_type_ids {
            let type_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;
            self.session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])?
        } else {
            self.session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])?
        };

        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(BatchOutput {
            shape: output_shape.to_vec(),
            data: output_data.to_vec(),
            attention_mask,
            seq_len,
        })
    }
}

/// Two-label sequence classifier.
pub struct OnnxClassifier {
    name: String,
    model: Arc<Mutex<OnnxModel>>,
}

impl OnnxClassifier {
    pub fn load(model_dir: &Path, max_length: usize, truncation: Truncation) -> anyhow::Result<Self> {
        Ok(Self {
            name: model_name(model_dir),
            model: Arc::new(Mutex::new(OnnxModel::load(model_dir, max_length, truncation)?)),
        })
    }

    fn classify_blocking(model: &Mutex<OnnxModel>, text: &str, max_length: usize) -> Result<LabelDistribution> {
        let mut model = model.lock().unwrap_or_else(|e| e.into_inner());
        model.set_max_length(max_length).map_err(unavailable)?;
        let encodings = model.encode(&[text])?;
        let out = model.run(&encodings).map_err(unavailable)?;
        if out.shape != [1, 2] {
            return Err(ReviewError::ModelUnavailable(format!(
                "unexpected logits shape: {:?}, expected [1, 2]",
                out.shape
            )));
        }
        Ok(LabelDistribution::from_logits([out.data[0], out.data[1]]))
    }
}

#[async_trait]
impl ClassificationPort for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, text: &str, max_length: usize) -> Result<LabelDistribution> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || Self::classify_blocking(&model, &text, max_length))
            .await
            .map_err(|e| ReviewError::ModelUnavailable(format!("inference task failed: {e}")))?
    }
}

/// Mean-pooled sentence embeddings.
pub struct OnnxEmbedder {
    name: String,
    dim: usize,
    model: Mutex<OnnxModel>,
}

impl OnnxEmbedder {
    /// Embeddings always truncate; similarity never rejects long text.
    pub fn load(model_dir: &Path, max_length: usize) -> anyhow::Result<Self> {
        let model = OnnxModel::load(model_dir, max_length, Truncation::Truncate)?;
        let dim = infer_dim(model.session.outputs()[0].dtype()).unwrap_or(384);
        Ok(Self {
            name: model_name(model_dir),
            dim,
            model: Mutex::new(model),
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let batch_size = texts.len();
        let out = {
            let mut model = self.model.lock().unwrap_or_else(|e| e.into_inner());
            let encodings = model.encode(texts)?;
            model.run(&encodings)?
        };

        let dims = &out.shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] as usize == batch_size && dims[2] as usize == self.dim,
            "unexpected output shape: {dims:?}, expected [{batch_size}, {}, {}]",
            out.seq_len,
            self.dim
        );
        let actual_seq_len = dims[1] as usize;

        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mut pooled = vec![0.0f32; self.dim];
            let mut token_count = 0.0f32;
            for j in 0..actual_seq_len {
                let mask = out.attention_mask[i * out.seq_len + j] as f32;
                if mask > 0.0 {
                    let offset = (i * actual_seq_len + j) * self.dim;
                    for (d, p) in pooled.iter_mut().enumerate() {
                        *p += out.data[offset + d] * mask;
                    }
                    token_count += mask;
                }
            }
            if token_count > 0.0 {
                for p in &mut pooled {
                    *p /= token_count;
                }
            }
            normalize(&mut pooled);
            embeddings.push(pooled);
        }
        Ok(embeddings)
    }
}

impl TextEncoder for OnnxEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts).map_err(unavailable)
    }
}

fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
