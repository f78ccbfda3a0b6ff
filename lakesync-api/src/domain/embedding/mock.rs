//! Deterministic embedding model for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::EmbeddingModel;

/// Test double that produces deterministic vectors, records its inputs and
/// can be configured to reject inputs over a size threshold the way a real
/// model does.
#[derive(Clone)]
pub struct MockEmbeddingModel {
    dimensions: usize,
    reject_over: Option<usize>,
    length_vectors: bool,
    calls: Arc<AtomicUsize>,
    last_input: Arc<Mutex<Option<String>>>,
}

impl MockEmbeddingModel {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            reject_over: None,
            length_vectors: false,
            calls: Arc::new(AtomicUsize::new(0)),
            last_input: Arc::new(Mutex::new(None)),
        }
    }

    /// Rejects inputs longer than `max_len` with the model's
    /// "input too large" error.
    pub fn rejecting_over(mut self, max_len: usize) -> Self {
        self.reject_over = Some(max_len);
        self
    }

    /// Makes every vector component equal to the input length, so averaging
    /// is observable in tests.
    pub fn with_length_vectors(mut self) -> Self {
        self.length_vectors = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbeddingModel {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(max_len) = self.reject_over {
            if text.len() > max_len {
                return Err(PipelineError::EmbeddingInputTooLarge(format!(
                    "input ({} tokens) is too large",
                    text.len()
                )));
            }
        }

        *self.last_input.lock().unwrap() = Some(text.to_string());

        if self.length_vectors {
            return Ok(vec![text.len() as f64; self.dimensions]);
        }

        // Cheap deterministic vector derived from the bytes of the input.
        let mut vector = vec![0.0; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimensions] += byte as f64 / 255.0;
        }
        Ok(vector)
    }
}
