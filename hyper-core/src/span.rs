//! Byte spans and line/column lookup for template sources.

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` into the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} is past end {end}");
        Span { start, end }
    }

    /// Zero-length span anchored at `at`.
    pub fn point(at: usize) -> Self {
        Span { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `offset` lies inside the span. The end offset counts as
    /// inside so a cursor sitting right after the last character still
    /// resolves.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Precomputed line starts for offset -> (line, column) conversion.
///
/// Lines and columns are 0-based; columns count bytes, matching the
/// offsets carried by pieces.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        (line, offset - self.line_starts[line])
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_tracks_newlines() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line_col(0), (0, 0));
        assert_eq!(index.line_col(4), (1, 1));
        assert_eq!(index.line_col(6), (2, 0));
        assert_eq!(index.line_col(8), (3, 1));
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn line_col_clamps_past_end() {
        let index = LineIndex::new("abc");
        assert_eq!(index.line_col(99), (0, 3));
    }

    #[test]
    fn point_span_contains_its_anchor() {
        let span = Span::point(5);
        assert!(span.is_empty());
        assert!(span.contains(5));
        assert!(!span.contains(6));
    }
}
