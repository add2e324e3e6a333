//! Mapping between byte offsets and line/column positions.

use text_size::TextSize;

/// Zero-based line and column for a byte offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// Precomputed newline table for one source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineIndex {
    /// Offset of the first byte of each line. Always starts with 0.
    line_starts: Vec<TextSize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![TextSize::new(0)];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(TextSize::new(i as u32 + 1));
            }
        }
        Self { line_starts }
    }

    /// Zero-based position of `offset`. Columns count bytes, not characters.
    pub fn line_col(&self, offset: TextSize) -> LineCol {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let col = offset - self.line_starts[line];
        LineCol {
            line: line as u32,
            col: col.into(),
        }
    }

    /// Offset of the first byte of a zero-based line, if it exists.
    pub fn line_start(&self, line: u32) -> Option<TextSize> {
        self.line_starts.get(line as usize).copied()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let index = LineIndex::new("hello");
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.line_col(TextSize::new(0)), LineCol { line: 0, col: 0 });
        assert_eq!(index.line_col(TextSize::new(4)), LineCol { line: 0, col: 4 });
    }

    #[test]
    fn test_multi_line() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_col(TextSize::new(0)), LineCol { line: 0, col: 0 });
        assert_eq!(index.line_col(TextSize::new(3)), LineCol { line: 1, col: 0 });
        assert_eq!(index.line_col(TextSize::new(4)), LineCol { line: 1, col: 1 });
        assert_eq!(index.line_col(TextSize::new(6)), LineCol { line: 2, col: 0 });
        assert_eq!(index.line_col(TextSize::new(8)), LineCol { line: 3, col: 1 });
    }

    #[test]
    fn test_offset_at_end_of_text() {
        let index = LineIndex::new("ab\ncd");
        assert_eq!(index.line_col(TextSize::new(5)), LineCol { line: 1, col: 2 });
    }

    #[test]
    fn test_line_start() {
        let index = LineIndex::new("ab\ncd");
        assert_eq!(index.line_start(0), Some(TextSize::new(0)));
        assert_eq!(index.line_start(1), Some(TextSize::new(3)));
        assert_eq!(index.line_start(2), None);
    }
}
