//! Text-to-vector encoding shared by the similarity index and the trainable
//! classification head.

use crate::error::Result;

/// Maps texts to fixed-size, L2-normalised vectors.
pub trait TextEncoder: Send + Sync {
    /// Name recorded in training metadata.
    fn name(&self) -> &str;

    fn dim(&self) -> usize;

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text])?;
        Ok(vectors.pop().unwrap_or_else(|| vec![0.0; self.dim()]))
    }
}

/// Signed feature hashing over lowercase word unigrams and bigrams.
///
/// Needs no model files, and the same text always maps to the same vector.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dim: usize,
}

impl HashingEncoder {
    pub const DEFAULT_DIM: usize = 512;

    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            self.add_feature(&mut v, token);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut v, &format!("{} {}", pair[0], pair[1]));
        }

        normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % self.dim as u64) as usize;
        // Top bit picks the sign so collisions tend to cancel.
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign;
    }
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

impl TextEncoder for HashingEncoder {
    fn name(&self) -> &str {
        "feature-hashing"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// L2-normalize a vector in place.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two unit vectors.
pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
