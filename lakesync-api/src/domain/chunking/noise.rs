use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

// Standalone page-number lines: "Page 3", "p.3", "3 of 15", "3/15", "- 12 -",
// or a bare 1-4 digit number.
static PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^\s*(?:(?:page|p\.?)\s*\d+(?:\s*(?:of|/)\s*\d+)?|\d+\s*(?:of|/)\s*\d+|-\s*\d+\s*-|\d{1,4})\s*$",
    )
    .expect("valid page number regex")
});

// Header/footer boilerplate lines.
static HEADER_FOOTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^\s*(?:(?:confidential|draft|internal use only|do not distribute|privileged)|(?:copyright|©)\s*(?:\d{4}|\(c\)).*|(?:all rights reserved).*|(?:printed on|generated on|last (?:updated|modified))\s+.*)\s*$",
    )
    .expect("valid header/footer regex")
});

// Encoding artifacts: NUL, form feed, BOM, soft hyphen, zero-width marks,
// Unicode line/paragraph separators.
static ENCODING_ARTIFACTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new("\u{0000}|\u{000C}|\u{FEFF}|\u{00AD}|[\u{200B}-\u{200F}]|[\u{2028}\u{2029}]")
        .expect("valid artifact regex")
});

// Table-of-contents leaders and rules.
static DOT_LEADERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.·…]{5,}|[-_=]{5,}").expect("valid leader regex"));

static EXCESSIVE_BLANKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("valid blank-line regex"));

static HORIZONTAL_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\x0B\x0C\r]+").expect("valid whitespace regex"));

/// Maximum allowed run length of a single repeated character; longer runs are
/// dropped entirely.
const MAX_CHAR_RUN: usize = 10;

/// Deterministic cleaning pipeline that removes noise from extracted document
/// text before chunking: encoding artifacts, page numbers, header/footer
/// boilerplate and formatting garbage.
pub struct NoiseReduction {
    aggressive: bool,
}

impl NoiseReduction {
    /// `aggressive` additionally removes lines that repeat across the
    /// document (headers, footers, watermarks).
    pub fn new(aggressive: bool) -> Self {
        Self { aggressive }
    }

    pub fn clean(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let mut result = ENCODING_ARTIFACTS.replace_all(text, "").into_owned();
        result = collapse_repeated_runs(&result);

        result = HORIZONTAL_WHITESPACE.replace_all(&result, " ").into_owned();
        result = DOT_LEADERS.replace_all(&result, " ").into_owned();

        result = PAGE_NUMBER.replace_all(&result, "").into_owned();
        result = HEADER_FOOTER.replace_all(&result, "").into_owned();

        if self.aggressive {
            result = remove_repetitive_lines(&result);
        }

        result = EXCESSIVE_BLANKS.replace_all(&result, "\n\n").into_owned();
        let result = result.trim().to_string();

        let removed = text.len().saturating_sub(result.len());
        if removed > 0 {
            debug!(removed, original = text.len(), "Noise reduction removed characters");
        }

        result
    }
}

/// Removes runs of a single repeated character longer than [`MAX_CHAR_RUN`].
/// Line breaks are exempt; blank-line runs are handled separately.
fn collapse_repeated_runs(text: &str) -> String {
    fn keep(run: &str) -> bool {
        run.chars().count() <= MAX_CHAR_RUN || run.starts_with('\n') || run.starts_with('\r')
    }

    let mut out = String::with_capacity(text.len());
    let mut run_char: Option<char> = None;
    let mut run = String::new();

    for c in text.chars() {
        match run_char {
            Some(rc) if rc == c => run.push(c),
            _ => {
                if keep(&run) {
                    out.push_str(&run);
                }
                run.clear();
                run.push(c);
                run_char = Some(c);
            }
        }
    }
    if keep(&run) {
        out.push_str(&run);
    }

    out
}

/// Removes lines whose frequency across the document reaches
/// `max(3, line_count / 7)`, which typically indicates repeated headers,
/// footers or watermarks. Only considers lines of length 4..=99.
fn remove_repetitive_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 10 {
        return text.to_string();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in &lines {
        let trimmed = line.trim();
        if trimmed.len() > 3 && trimmed.len() < 100 {
            *counts.entry(trimmed).or_insert(0) += 1;
        }
    }

    let threshold = std::cmp::max(3, lines.len() / 7);
    let boilerplate: HashSet<&str> = counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(line, _)| line)
        .collect();

    if boilerplate.is_empty() {
        return text.to_string();
    }

    debug!(patterns = boilerplate.len(), "Removing repetitive boilerplate lines");

    let mut out = String::with_capacity(text.len());
    for line in lines {
        if !boilerplate.contains(line.trim()) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_encoding_artifacts() {
        let noise = NoiseReduction::new(false);
        let cleaned = noise.clean("a\u{0000}b\u{FEFF}c\u{00AD}d\u{200B}e\u{2028}f");
        assert_eq!(cleaned, "abcdef");
    }

    #[test]
    fn drops_long_character_runs() {
        let noise = NoiseReduction::new(false);
        assert_eq!(noise.clean("before aaaaaaaaaaaa after"), "before after");
        // A run of exactly 10 is kept.
        let kept = noise.clean("xxxxxxxxxx end");
        assert!(kept.starts_with("xxxxxxxxxx"));
    }

    #[test]
    fn collapses_horizontal_whitespace_and_leaders() {
        let noise = NoiseReduction::new(false);
        assert_eq!(noise.clean("a \t  b"), "a b");

        let toc = noise.clean("Intro .......... 4\nBody");
        assert!(!toc.contains(".."));
        assert!(toc.starts_with("Intro"));

        assert_eq!(noise.clean("above\n-----\nbelow"), "above\n \nbelow");
    }

    #[test]
    fn removes_page_number_lines() {
        let noise = NoiseReduction::new(false);
        let text = "Real content\nPage 3\n3 of 15\n- 12 -\n42\nMore content";
        let cleaned = noise.clean(text);
        assert!(cleaned.contains("Real content"));
        assert!(cleaned.contains("More content"));
        assert!(!cleaned.contains("Page 3"));
        assert!(!cleaned.contains("of 15"));
        assert!(!cleaned.contains("- 12 -"));
        assert!(!cleaned.contains("42"));
    }

    #[test]
    fn removes_header_footer_boilerplate() {
        let noise = NoiseReduction::new(false);
        let text = "Findings\nCONFIDENTIAL\nCopyright 2024 Acme Corp\nAll rights reserved.\nConclusion";
        let cleaned = noise.clean(text);
        assert!(cleaned.contains("Findings"));
        assert!(cleaned.contains("Conclusion"));
        assert!(!cleaned.to_lowercase().contains("confidential"));
        assert!(!cleaned.contains("Copyright"));
    }

    #[test]
    fn aggressive_mode_removes_repeated_lines() {
        let noise = NoiseReduction::new(true);
        let mut text = String::new();
        for i in 0..12 {
            text.push_str("Acme Quarterly Report\n");
            text.push_str(&format!("Unique line number {} with content\n", i));
        }
        let cleaned = noise.clean(&text);
        assert!(!cleaned.contains("Acme Quarterly Report"));
        assert!(cleaned.contains("Unique line number 3"));
    }

    #[test]
    fn collapses_blank_line_runs() {
        let noise = NoiseReduction::new(false);
        let cleaned = noise.clean("para one\n\n\n\n\n\npara two");
        assert_eq!(cleaned, "para one\n\npara two");
    }

    #[test]
    fn clean_is_idempotent() {
        let noise = NoiseReduction::new(true);
        let messy = "Title\u{FEFF}\n\n\n\n\nPage 1\nBody text with   spaces.\n........\nCONFIDENTIAL\nBody continues here.";
        let once = noise.clean(messy);
        let twice = noise.clean(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn blank_input_maps_to_empty() {
        let noise = NoiseReduction::new(false);
        assert_eq!(noise.clean(""), "");
        assert_eq!(noise.clean("  \n \t "), "");
    }
}
