//! Fixed-window chunker — spec §4.1.
//!
//! Splits one document's page records into overlapping fixed-size windows,
//! preferring paragraph > sentence > line > word breakpoints over a hard
//! character cut, and never splitting inside a multi-byte grapheme.

use crate::types::{DocumentSource, PageRecord};

#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub text: String,
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size,
        }
    }

    /// Concatenate a document's page records (order-preserving) and chunk the result.
    /// Concatenation with `\n\n` recovers the input up to whitespace normalization,
    /// satisfying the spec's round-trip invariant.
    pub fn chunk_document(&self, doc: &DocumentSource) -> Vec<ChunkResult> {
        self.chunk(&doc.full_text())
    }

    pub fn chunk_pages(&self, records: &[PageRecord]) -> Vec<ChunkResult> {
        let text = records
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.chunk(&text)
    }

    pub fn chunk(&self, text: &str) -> Vec<ChunkResult> {
        if text.is_empty() {
            return Vec::new();
        }

        if text.len() <= self.chunk_size {
            if text.trim().is_empty() || text.len() < self.min_chunk_size {
                return Vec::new();
            }
            return vec![ChunkResult {
                text: text.to_string(),
                index: 0,
                start_offset: 0,
                end_offset: text.len(),
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut index = 0;

        while start < text.len() {
            let raw_end = (start + self.chunk_size).min(text.len());
            let end = snap_to_char_boundary(text, raw_end);

            let actual_end = if end < text.len() {
                self.find_break_point(text, start, end)
            } else {
                end
            };

            let chunk_text = &text[start..actual_end];

            if !chunk_text.trim().is_empty() && chunk_text.len() >= self.min_chunk_size {
                chunks.push(ChunkResult {
                    text: chunk_text.to_string(),
                    index,
                    start_offset: start,
                    end_offset: actual_end,
                });
                index += 1;
            }

            let step = if actual_end > start && actual_end - start > self.chunk_overlap {
                actual_end - start - self.chunk_overlap
            } else {
                (actual_end - start).max(1)
            };

            let raw_next = start + step;
            let next_start = snap_to_char_boundary(text, raw_next);
            if next_start <= start {
                break;
            }
            start = next_start;
        }

        chunks
    }

    fn find_break_point(&self, text: &str, start: usize, preferred_end: usize) -> usize {
        let raw_search_start = if preferred_end > 200 {
            preferred_end - 200
        } else {
            start
        };
        let search_start = snap_to_char_boundary(text, raw_search_start.max(start));
        let safe_end = snap_to_char_boundary(text, preferred_end);

        if search_start >= safe_end {
            return safe_end;
        }

        let search_region = &text[search_start..safe_end];

        // Priority: paragraph break > sentence end > line break > word break.
        if let Some(pos) = search_region.rfind("\n\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(". ") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(".\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind('\n') {
            return search_start + pos + 1;
        }
        if let Some(pos) = search_region.rfind(' ') {
            return search_start + pos + 1;
        }

        safe_end
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(500, 10, 20)
    }
}

/// Snap a byte offset to the nearest valid UTF-8 char boundary (rounding down).
fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_output() {
        let chunker = TextChunker::new(500, 10, 20);
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn output_never_exceeds_window_size() {
        let chunker = TextChunker::new(100, 10, 5);
        let text = "word ".repeat(200);
        let chunks = chunker.chunk(&text);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.len() <= 100, "chunk len {} exceeds window", c.text.len());
        }
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let chunker = TextChunker::new(50, 10, 5);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi omicron pi";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let prev = &pair[0];
            let next = &pair[1];
            assert!(next.start_offset <= prev.end_offset);
        }
    }

    #[test]
    fn never_splits_a_multibyte_grapheme() {
        let chunker = TextChunker::new(10, 2, 1);
        let text = "héllo wörld héllo wörld héllo wörld";
        let chunks = chunker.chunk(text);
        for c in &chunks {
            assert!(text.is_char_boundary(c.start_offset));
            assert!(text.is_char_boundary(c.end_offset));
        }
    }

    #[test]
    fn chunk_pages_preserves_order() {
        let chunker = TextChunker::new(500, 10, 1);
        let records = vec![
            PageRecord { page_index: 0, text: "Page one content.".into() },
            PageRecord { page_index: 1, text: "Page two content.".into() },
        ];
        let chunks = chunker.chunk_pages(&records);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("Page one"));
        assert!(chunks[0].text.ends_with("Page two content."));
    }
}
