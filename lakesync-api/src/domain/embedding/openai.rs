//! Embedding model speaking the OpenAI-compatible embeddings wire format.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::EmbeddingModel;

// "input (N tokens) is too large" as reported by the model server.
static TOO_LARGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"input \(\d+ tokens\) is too large").expect("valid regex"));

pub struct OpenAiEmbeddingModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
}

impl OpenAiEmbeddingModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| PipelineError::Backend(format!("embedding request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_model_error(status.as_u16(), &body));
        }

        let parsed: EmbeddingsResponse = resp.json().await.map_err(|e| {
            PipelineError::Backend(format!("embedding response parse failed: {}", e))
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| PipelineError::Backend("no embedding in response".to_string()))
    }
}

/// Classifies a model server error, detecting the "input too large" family so
/// the caller can recover locally.
fn classify_model_error(status: u16, body: &str) -> PipelineError {
    if TOO_LARGE.is_match(body) || body.contains("physical batch size") {
        PipelineError::EmbeddingInputTooLarge(body.to_string())
    } else {
        PipelineError::Backend(format!(
            "embedding endpoint returned status {}: {}",
            status, body
        ))
    }
}
