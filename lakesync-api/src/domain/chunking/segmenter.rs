//! Splitting text into structural units (sections, paragraphs, sentences)
//! while tracking byte offsets into the input.

use once_cell::sync::Lazy;
use regex::Regex;

/// A segment of text with its position in the input it was split from.
/// `text` is trimmed; the offsets span the untrimmed slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub(crate) fn from_span(input: &str, start: usize, end: usize) -> Option<Self> {
        let text = input[start..end].trim();
        if text.is_empty() {
            return None;
        }
        Some(Segment {
            text: text.to_string(),
            start,
            end,
        })
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Shifts the segment's offsets by `base`, for splits performed on a
    /// sub-slice of the original text.
    pub fn rebase(mut self, base: usize) -> Self {
        self.start += base;
        self.end += base;
        self
    }
}

// Paragraph boundary: two or more newlines (possibly with whitespace between).
static PARAGRAPH_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

// Section headings: markdown #..######, "chapter/section/article/part <N|roman>",
// numbered "1." / "1.1" followed by a capital.
static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^\s*(?:\#{1,6}\s+|(?:chapter|section|article|part)\s+[\divxlc]+|\d+(?:\.\d+)*\.?\s+[A-Z])",
    )
    .expect("valid heading regex")
});

// All-caps heading lines of at least four characters, matched case-sensitively.
static ALL_CAPS_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[A-Z][A-Z\s]{3,}$").expect("valid caps heading regex"));

/// Splits text at section headings, keeping each heading with the content
/// that follows it until the next heading.
pub fn split_sections(text: &str) -> Vec<Segment> {
    let mut heading_starts: Vec<usize> = SECTION_HEADING
        .find_iter(text)
        .map(|m| m.start())
        .chain(ALL_CAPS_HEADING.find_iter(text).map(|m| m.start()))
        .collect();
    heading_starts.sort_unstable();
    heading_starts.dedup();

    if heading_starts.is_empty() {
        return Segment::from_span(text, 0, text.len()).into_iter().collect();
    }

    let mut sections = Vec::new();

    if heading_starts[0] > 0 {
        sections.extend(Segment::from_span(text, 0, heading_starts[0]));
    }

    for (i, &start) in heading_starts.iter().enumerate() {
        let end = heading_starts
            .get(i + 1)
            .copied()
            .unwrap_or(text.len());
        sections.extend(Segment::from_span(text, start, end));
    }

    sections
}

/// Splits text into paragraphs separated by blank lines.
pub fn split_paragraphs(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last_end = 0;

    for boundary in PARAGRAPH_BOUNDARY.find_iter(text) {
        segments.extend(Segment::from_span(text, last_end, boundary.start()));
        last_end = boundary.end();
    }
    segments.extend(Segment::from_span(text, last_end, text.len()));

    segments
}

/// Splits text into sentences: `[.!?]` followed by whitespace and a capital,
/// newline boundaries, and `;` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<Segment> {
    let mut boundaries = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (pos, &(_, c)) in chars.iter().enumerate() {
        match c {
            '.' | '!' | '?' => {
                // Needs at least one whitespace char, then an uppercase letter.
                let mut j = pos + 1;
                let mut saw_ws = false;
                while j < chars.len() && chars[j].1.is_whitespace() {
                    saw_ws = true;
                    j += 1;
                }
                if saw_ws && j < chars.len() && chars[j].1.is_uppercase() {
                    boundaries.push(chars[j].0);
                }
            }
            ';' => {
                if chars.get(pos + 1).is_some_and(|&(_, next)| next.is_whitespace()) {
                    let mut j = pos + 1;
                    while j < chars.len() && chars[j].1.is_whitespace() {
                        j += 1;
                    }
                    let boundary = chars.get(j).map(|&(i, _)| i).unwrap_or(text.len());
                    boundaries.push(boundary);
                }
            }
            '\n' => {
                let mut j = pos + 1;
                while j < chars.len() && chars[j].1.is_whitespace() {
                    j += 1;
                }
                if j < chars.len() {
                    boundaries.push(chars[j].0);
                }
            }
            _ => {}
        }
    }

    boundaries.sort_unstable();
    boundaries.dedup();

    let mut segments = Vec::new();
    let mut last = 0;
    for boundary in boundaries {
        if boundary > last {
            segments.extend(Segment::from_span(text, last, boundary));
            last = boundary;
        }
    }
    segments.extend(Segment::from_span(text, last, text.len()));

    segments
}
