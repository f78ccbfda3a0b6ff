use tracing::warn;

use super::segmenter::{split_paragraphs, split_sections, split_sentences, Segment};
use super::{Chunk, ChunkingConfig, ChunkingStrategy};

/// Adaptive chunking that works for all document types.
///
/// Strategy hierarchy, tried in order until segments fit:
/// 1. section-level splitting (headings, chapters)
/// 2. paragraph-level splitting (blank lines)
/// 3. sentence-level splitting
/// 4. hard character-based splitting (last resort)
///
/// No emitted chunk exceeds `max_chunk_size`, even for pathological inputs.
pub struct AdaptiveChunking;

impl ChunkingStrategy for AdaptiveChunking {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn chunk(&self, text: &str, node_id: &str, config: &ChunkingConfig) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut segments = split_sections(text);

        if has_oversized(&segments, config.max_chunk_size) {
            segments = split_recursive(segments, config.max_chunk_size);
        }

        let grouped = group_with_hard_limit(segments, config);

        grouped
            .into_iter()
            .enumerate()
            .map(|(index, seg)| Chunk::new(node_id, seg.text, index, seg.start, seg.end))
            .collect()
    }
}

/// Recursively refines oversized segments: paragraphs, then sentences, then a
/// hard split.
fn split_recursive(segments: Vec<Segment>, max_size: usize) -> Vec<Segment> {
    let mut result = Vec::new();

    for segment in segments {
        if segment.len() <= max_size {
            result.push(segment);
            continue;
        }

        let base = segment.start;

        let paragraphs = split_paragraphs(&segment.text);
        if paragraphs.len() > 1 && !has_oversized(&paragraphs, max_size) {
            result.extend(paragraphs.into_iter().map(|p| p.rebase(base)));
            continue;
        }

        let sentences = split_sentences(&segment.text);
        if sentences.len() > 1 && !has_oversized(&sentences, max_size) {
            result.extend(sentences.into_iter().map(|s| s.rebase(base)));
            continue;
        }

        warn!(
            segment_len = segment.len(),
            max_size, "Oversized segment requires hard splitting"
        );
        result.extend(hard_split(&segment.text, max_size).into_iter().map(|s| s.rebase(base)));
    }

    result
}

/// Groups segments while enforcing a hard limit on chunk size. A single
/// segment that still exceeds the limit is split further before grouping.
fn group_with_hard_limit(segments: Vec<Segment>, config: &ChunkingConfig) -> Vec<Segment> {
    let mut grouped: Vec<Segment> = Vec::new();
    let mut current = String::new();
    let mut current_start: Option<usize> = None;
    let mut current_end = 0;

    let mut flush = |current: &mut String, start: &mut Option<usize>, end: usize, out: &mut Vec<Segment>| {
        if !current.is_empty() {
            out.push(Segment {
                text: current.trim().to_string(),
                start: start.unwrap_or(0),
                end,
            });
            current.clear();
            *start = None;
        }
    };

    for segment in segments {
        if segment.len() > config.max_chunk_size {
            flush(&mut current, &mut current_start, current_end, &mut grouped);
            grouped.extend(split_recursive(vec![segment], config.max_chunk_size));
            continue;
        }

        if current.len() + segment.len() + 1 > config.max_chunk_size
            && current.len() >= config.min_chunk_size
        {
            flush(&mut current, &mut current_start, current_end, &mut grouped);
        }

        if current_start.is_none() {
            current_start = Some(segment.start);
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&segment.text);
        current_end = segment.end;
    }

    flush(&mut current, &mut current_start, current_end, &mut grouped);

    grouped
}

/// Hard split at character boundaries, preferring the last space within the
/// second half of the window.
fn hard_split(text: &str, max_size: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut offset = 0;

    while offset < text.len() {
        let mut end = floor_char_boundary(text, std::cmp::min(offset + max_size, text.len()));

        if end < text.len() {
            if let Some(last_space) = text[..end].rfind(' ') {
                if last_space > offset + max_size / 2 {
                    end = last_space;
                }
            }
        }

        if end <= offset {
            // No progress is possible at a smaller boundary; take the full
            // window regardless of spaces.
            end = floor_char_boundary(text, std::cmp::min(offset + max_size, text.len()));
            if end <= offset {
                break;
            }
        }

        segments.extend(Segment::from_span(text, offset, end));
        offset = end;
    }

    segments
}

fn has_oversized(segments: &[Segment], max_size: usize) -> bool {
    segments.iter().any(|s| s.len() > max_size)
}

/// Largest index `<= at` that lies on a char boundary.
fn floor_char_boundary(text: &str, at: usize) -> usize {
    let mut i = at.min(text.len());
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
