use super::{Chunk, ChunkingConfig, ChunkingError, ChunkingStrategy};

/// Fixed-window chunking: advance by `chunk_size` characters, snap the end to
/// the last space within the window, and start the next chunk `overlap`
/// characters before the previous end.
///
/// `overlap < chunk_size` is enforced at construction; together with the
/// forced `start = end` fallback this guarantees the loop terminates for any
/// input.
pub struct FixedWindowChunking {
    chunk_size: usize,
    overlap: usize,
}

impl FixedWindowChunking {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap,
                chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

impl ChunkingStrategy for FixedWindowChunking {
    fn name(&self) -> &'static str {
        "fixed-window"
    }

    fn chunk(&self, text: &str, node_id: &str, _config: &ChunkingConfig) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();

        if text.trim().is_empty() {
            return chunks;
        }

        let mut start = 0;
        let mut index = 0;

        while start < text.len() {
            let mut end = floor_char_boundary(text, std::cmp::min(start + self.chunk_size, text.len()));

            // Break at a word boundary when one exists inside the window.
            if end < text.len() {
                if let Some(last_space) = text[..end].rfind(' ') {
                    if last_space > start {
                        end = last_space;
                    }
                }
            }

            if end <= start {
                break;
            }

            let chunk_text = text[start..end].trim();
            if !chunk_text.is_empty() {
                chunks.push(Chunk::new(node_id, chunk_text.to_string(), index, start, end));
                index += 1;
            }

            let mut next_start = ceil_char_boundary(text, end.saturating_sub(self.overlap));
            if let Some(last) = chunks.last() {
                if next_start <= last.start_offset {
                    next_start = end;
                }
            } else if next_start <= start {
                next_start = end;
            }
            start = next_start;
        }

        chunks
    }
}

fn floor_char_boundary(text: &str, at: usize) -> usize {
    let mut i = at.min(text.len());
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(text: &str, at: usize) -> usize {
    let mut i = at.min(text.len());
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
        FixedWindowChunking::new(size, overlap)
            .unwrap()
            .chunk(text, "n", &ChunkingConfig::default())
    }

    #[test]
    fn construction_rejects_bad_parameters() {
        assert!(matches!(
            FixedWindowChunking::new(0, 0),
            Err(ChunkingError::ZeroChunkSize)
        ));
        assert!(matches!(
            FixedWindowChunking::new(100, 100),
            Err(ChunkingError::OverlapTooLarge { .. })
        ));
        assert!(matches!(
            FixedWindowChunking::new(100, 150),
            Err(ChunkingError::OverlapTooLarge { .. })
        ));
        assert!(FixedWindowChunking::new(100, 20).is_ok());
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = chunk("hello world", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(chunk("", 100, 10).is_empty());
        assert!(chunk("    ", 100, 10).is_empty());
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let words = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunk(words, 20, 5);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset < pair[0].end_offset + 1);
            assert!(pair[1].start_offset > pair[0].start_offset);
        }
    }

    #[test]
    fn terminates_on_text_without_spaces() {
        let text = "z".repeat(1000);
        let chunks = chunk(&text, 100, 30);
        assert!(!chunks.is_empty());
        // Strictly increasing starts prove forward progress.
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
        }
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
    }

    #[test]
    fn indices_increase_from_zero() {
        let text = "word ".repeat(100);
        let chunks = chunk(&text, 40, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }
}
