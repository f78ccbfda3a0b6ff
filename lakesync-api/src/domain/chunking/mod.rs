//! Text chunking: noise reduction plus size-bounded splitting strategies.

mod adaptive;
mod fixed;
mod noise;
mod segmenter;

pub use adaptive::AdaptiveChunking;
pub use fixed::FixedWindowChunking;
pub use noise::NoiseReduction;

use tracing::{info, warn};

/// An offset-tagged substring of a document's cleaned text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub node_id: String,
    pub text: String,
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Chunk {
    pub fn new(
        node_id: &str,
        text: String,
        index: usize,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Self {
            id: format!("{}_chunk_{}", node_id, index),
            node_id: node_id.to_string(),
            text,
            index,
            start_offset,
            end_offset,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 200,
            max_chunk_size: 1000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkingError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,
    #[error("overlap must be < chunk_size to avoid infinite loops (overlap={overlap}, chunk_size={chunk_size})")]
    OverlapTooLarge { overlap: usize, chunk_size: usize },
}

/// Strategy for splitting cleaned document text into chunks.
pub trait ChunkingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Splits text into ordered chunks whose offsets refer to `text`.
    fn chunk(&self, text: &str, node_id: &str, config: &ChunkingConfig) -> Vec<Chunk>;
}

/// Chunking pipeline: noise reduction followed by a strategy.
pub struct ChunkingService {
    noise: NoiseReduction,
    config: ChunkingConfig,
    strategy: Box<dyn ChunkingStrategy>,
}

impl ChunkingService {
    pub fn new(
        noise: NoiseReduction,
        config: ChunkingConfig,
        strategy: Box<dyn ChunkingStrategy>,
    ) -> Self {
        Self {
            noise,
            config,
            strategy,
        }
    }

    /// Cleans the text and chunks it. Returns no chunks when the text is
    /// blank before or after cleaning.
    pub fn chunk(&self, text: &str, node_id: &str, mime_type: Option<&str>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let cleaned = self.noise.clean(text);
        if cleaned.trim().is_empty() {
            warn!(node_id, "Text became empty after noise reduction");
            return Vec::new();
        }

        let chunks = self.strategy.chunk(&cleaned, node_id, &self.config);

        info!(
            node_id,
            mime_type = mime_type.unwrap_or("unknown"),
            chunks = chunks.len(),
            strategy = self.strategy.name(),
            "Chunking complete"
        );

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_combines_node_and_index() {
        let chunk = Chunk::new("node-9", "text".to_string(), 3, 0, 4);
        assert_eq!(chunk.id, "node-9_chunk_3");
    }

    #[test]
    fn service_returns_nothing_for_blank_input() {
        let service = ChunkingService::new(
            NoiseReduction::new(false),
            ChunkingConfig::default(),
            Box::new(AdaptiveChunking),
        );
        assert!(service.chunk("", "n", None).is_empty());
        assert!(service.chunk("   \n\n  ", "n", None).is_empty());
    }

    #[test]
    fn service_cleans_then_chunks() {
        let service = ChunkingService::new(
            NoiseReduction::new(false),
            ChunkingConfig::default(),
            Box::new(AdaptiveChunking),
        );
        let chunks = service.chunk("Some\u{0000} content worth keeping.", "n", Some("text/plain"));
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].text.contains('\u{0000}'));
    }
}
