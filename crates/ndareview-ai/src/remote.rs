//! Classification port served by a remote inference endpoint.
//!
//! `POST {base_url}/classify` with `{"text": ..., "max_length": ...}`;
//! the response is `{"probabilities": [p0, p1]}`.

use async_trait::async_trait;
use ndareview_core::{Result, ReviewError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::port::{ClassificationPort, LabelDistribution};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
}

impl From<RemoteError> for ReviewError {
    fn from(e: RemoteError) -> Self {
        ReviewError::ModelUnavailable(e.to_string())
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
    max_length: usize,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    probabilities: [f32; 2],
}

pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
    name: String,
}

impl HttpClassifier {
    /// `base_url` like `http://localhost:8000`; a trailing slash is dropped.
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            name: format!("http:{base_url}"),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn classify(&self, text: &str, max_length: usize) -> std::result::Result<[f32; 2], RemoteError> {
        let url = format!("{}/classify", self.base_url);
        debug!(url = %url, chars = text.len(), "remote classify");
        let resp = self
            .client
            .post(&url)
            .json(&ClassifyRequest { text, max_length })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let result: ClassifyResponse = resp.json().await?;
        Ok(result.probabilities)
    }
}

#[async_trait]
impl ClassificationPort for HttpClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, text: &str, max_length: usize) -> Result<LabelDistribution> {
        let [p0, p1] = self.classify(text, max_length).await?;
        Ok(LabelDistribution::new(p0, p1))
    }
}
