//! Embedding generation with local recovery for oversized inputs.

mod openai;

#[cfg(test)]
pub mod mock;

pub use openai::OpenAiEmbeddingModel;

use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use super::chunking::Chunk;
use super::error::{PipelineError, Result};
use super::traits::EmbeddingModel;

/// Hard cap for pathological inputs; rarely hit when chunking is configured
/// sensibly.
const SAFETY_CAP: usize = 3000;

/// Inputs at or below this size are trimmed instead of split when the model
/// rejects them.
const MIN_CHARS: usize = 200;

/// Window around the midpoint searched for a semantic split boundary.
const SPLIT_WINDOW: usize = 120;

/// Instruction prefix for query-time embedding.
///
/// Asymmetric models are trained to embed queries prefixed with a task
/// instruction while documents are embedded as-is. Document/chunk embeddings
/// never carry the prefix.
const QUERY_INSTRUCTION_PREFIX: &str =
    "Represent this sentence for searching relevant passages: ";

static HORIZONTAL_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\x0B\x0C\r]+").expect("valid whitespace regex"));
static NEWLINE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct ChunkWithEmbedding {
    pub chunk: Chunk,
    pub vector: Vec<f64>,
}

/// Embedding front-end over an [`EmbeddingModel`].
///
/// When the model rejects an input as too large, the text is split at a
/// semantic boundary near the midpoint, both halves are embedded recursively,
/// and the element-wise mean is returned. Short inputs are trimmed instead.
pub struct EmbeddingService<M> {
    model: M,
    model_name: String,
    query_prefix_enabled: bool,
}

impl<M: EmbeddingModel> EmbeddingService<M> {
    pub fn new(model: M, model_name: impl Into<String>, query_prefix_enabled: bool) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            query_prefix_enabled,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embeds document/chunk text, without any instruction prefix.
    pub async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        self.embed_with_fallback(sanitize(text)).await
    }

    /// Embeds a search query with the instruction prefix required by
    /// asymmetric embedding models, aligning the query vector with document
    /// vectors stored via [`embed`](Self::embed).
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f64>> {
        let sanitized = sanitize(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let input = if self.query_prefix_enabled {
            format!("{}{}", QUERY_INSTRUCTION_PREFIX, sanitized)
        } else {
            sanitized
        };
        self.embed_with_fallback(input).await
    }

    /// Embeds chunks, optionally prepending document metadata context to the
    /// text sent to the model. The stored chunk text is unchanged.
    pub async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        document_context: Option<&str>,
    ) -> Result<Vec<ChunkWithEmbedding>> {
        let context = document_context.filter(|c| !c.trim().is_empty());
        let mut results = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            if chunk.text.trim().is_empty() {
                continue;
            }

            let input = match context {
                Some(ctx) => format!("{}\n\n{}", ctx, chunk.text),
                None => chunk.text.clone(),
            };

            let vector = self.embed(&input).await?;
            results.push(ChunkWithEmbedding {
                chunk: chunk.clone(),
                vector,
            });
        }

        Ok(results)
    }

    fn embed_with_fallback(&self, text: String) -> BoxFuture<'_, Result<Vec<f64>>> {
        async move {
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }

            let mut text = text;
            if text.len() > SAFETY_CAP {
                warn!(
                    len = text.len(),
                    cap = SAFETY_CAP,
                    "Embedding input exceeds safety cap, truncating; check chunking configuration"
                );
                text.truncate(floor_char_boundary(&text, SAFETY_CAP));
            }

            match self.model.embed(&text).await {
                Ok(vector) => Ok(vector),
                Err(PipelineError::EmbeddingInputTooLarge(_)) if text.len() <= MIN_CHARS => {
                    let mut trimmed = trim_worst_parts(&text);
                    if trimmed.len() == text.len() {
                        let cut = half_length(&text);
                        warn!(
                            len = text.len(),
                            cut, "Embedding input still too large, last resort truncation"
                        );
                        trimmed = text[..cut].to_string();
                    } else {
                        warn!(
                            len = text.len(),
                            trimmed = trimmed.len(),
                            "Embedding input too large, dropped oversized tokens"
                        );
                    }
                    self.model.embed(&trimmed).await
                }
                Err(PipelineError::EmbeddingInputTooLarge(_)) => {
                    let mid = find_split_point(&text);
                    let left = text[..mid].to_string();
                    let right = text[mid..].to_string();

                    info!(
                        len = text.len(),
                        left = left.len(),
                        right = right.len(),
                        "Embedding input too large, splitting and averaging vectors"
                    );

                    let left_vec = self.embed_with_fallback(left).await?;
                    let right_vec = self.embed_with_fallback(right).await?;

                    if left_vec.is_empty() {
                        return Ok(right_vec);
                    }
                    if right_vec.is_empty() {
                        return Ok(left_vec);
                    }
                    if left_vec.len() != right_vec.len() {
                        return Err(PipelineError::InvariantViolation(format!(
                            "embedding dimension mismatch after split: left={}, right={}",
                            left_vec.len(),
                            right_vec.len()
                        )));
                    }

                    Ok(left_vec
                        .iter()
                        .zip(right_vec.iter())
                        .map(|(l, r)| (l + r) / 2.0)
                        .collect())
                }
                Err(e) => Err(e),
            }
        }
        .boxed()
    }
}

/// Drops NULs, collapses horizontal whitespace, compresses newline runs and
/// trims.
fn sanitize(text: &str) -> String {
    let no_nulls = text.replace('\u{0000}', "");
    let collapsed = HORIZONTAL_WHITESPACE.replace_all(&no_nulls, " ");
    let compressed = NEWLINE_RUNS.replace_all(&collapsed, "\n\n");
    compressed.trim().to_string()
}

/// Drops whitespace-separated tokens longer than 80 characters, which are
/// usually extraction garbage.
fn trim_worst_parts(text: &str) -> String {
    let kept: Vec<&str> = text.split(' ').filter(|part| part.len() <= 80).collect();
    kept.join(" ").trim().to_string()
}

/// Finds a split point within [`SPLIT_WINDOW`] characters of the midpoint,
/// preferring a newline, then a sentence end, then a space.
fn find_split_point(text: &str) -> usize {
    let mid = floor_char_boundary(text, text.len() / 2);

    if let Some(i) = last_index_before(text, '\n', mid, SPLIT_WINDOW) {
        return i;
    }
    if let Some(i) = last_index_before(text, '.', mid, SPLIT_WINDOW) {
        return i + 1;
    }
    if let Some(i) = last_index_before(text, ' ', mid, SPLIT_WINDOW) {
        return i;
    }

    mid.max(1)
}

fn last_index_before(text: &str, ch: char, from: usize, window: usize) -> Option<usize> {
    let start = from.saturating_sub(window);
    let bytes = text.as_bytes();
    let mut i = from.min(text.len().saturating_sub(1));
    loop {
        if bytes.get(i) == Some(&(ch as u8)) {
            return Some(i);
        }
        if i == start || i == 0 {
            return None;
        }
        i -= 1;
    }
}

fn half_length(text: &str) -> usize {
    let cut = floor_char_boundary(text, std::cmp::max(1, text.len() / 2));
    if cut == 0 {
        text.chars()
            .next()
            .map(|c| c.len_utf8())
            .unwrap_or(0)
    } else {
        cut
    }
}

fn floor_char_boundary(text: &str, at: usize) -> usize {
    let mut i = at.min(text.len());
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
