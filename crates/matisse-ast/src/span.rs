// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Source location tracking.

/// A span in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Whether the span covers nothing, as for synthesized nodes.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest span covering both.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Precomputed line-start offsets for O(log n) byte-offset → line:col lookup.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Byte offset of the start of each line. line_starts[0] is always 0.
    line_starts: Vec<u32>,
}

impl LineMap {
    /// Build a line map by scanning source for newlines. O(n).
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        LineMap { line_starts }
    }

    /// Convert byte offset to (line, col), both 1-based.
    pub fn offset_to_line_col(&self, offset: usize) -> (u32, u32) {
        let offset = offset as u32;
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line = (line_idx + 1) as u32;
        let col = offset - self.line_starts[line_idx] + 1;
        (line, col)
    }

    /// Byte offset where a 1-based line starts.
    pub fn line_start(&self, line: u32) -> Option<usize> {
        let idx = (line as usize).checked_sub(1)?;
        self.line_starts.get(idx).map(|&s| s as usize)
    }

    /// Get the source text of a 1-based line number.
    pub fn line_text<'a>(&self, source: &'a str, line: u32) -> Option<&'a str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)? as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&s| (s as usize).saturating_sub(1)) // exclude the \n
            .unwrap_or(source.len());
        source.get(start..end)
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source() {
        let lm = LineMap::new("");
        assert_eq!(lm.offset_to_line_col(0), (1, 1));
        assert_eq!(lm.line_count(), 1);
    }

    #[test]
    fn multi_line() {
        let src = "y = x;\nfor i = 1:3\nend";
        let lm = LineMap::new(src);
        assert_eq!(lm.line_count(), 3);
        assert_eq!(lm.offset_to_line_col(0), (1, 1));
        assert_eq!(lm.offset_to_line_col(7), (2, 1)); // 'f'
        assert_eq!(lm.offset_to_line_col(11), (2, 5));
        assert_eq!(lm.line_text(src, 2), Some("for i = 1:3"));
        assert_eq!(lm.line_text(src, 3), Some("end"));
        assert_eq!(lm.line_text(src, 4), None);
        assert_eq!(lm.line_start(2), Some(7));
    }

    #[test]
    fn crlf_keeps_carriage_return() {
        let src = "a\r\nb";
        let lm = LineMap::new(src);
        assert_eq!(lm.line_text(src, 1), Some("a\r"));
        assert_eq!(lm.offset_to_line_col(3), (2, 1));
    }

    #[test]
    fn merge_spans() {
        let a = Span::new(4, 9);
        let b = Span::new(1, 6);
        assert_eq!(a.merge(b), Span::new(1, 9));
    }
}
