use std::fmt;

use text_size::TextSize;

/// Location of a byte offset in the code.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// The lineno, counting from 1.
    pub lineno: u32,
    /// The column, counting from 1.
    pub column: u32,
    /// The byte offset, counting from 0.
    pub offset: u32,
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.lineno, self.column, self.offset)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lineno, self.column)
    }
}

/// Maps byte offsets to line and column numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Offset of the first byte of each line.
    line_starts: Vec<TextSize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![TextSize::from(0)];
        line_starts.extend(
            text.match_indices('\n')
                .filter_map(|(i, _)| TextSize::try_from(i + 1).ok()),
        );
        LineIndex { line_starts }
    }

    pub fn location(&self, offset: TextSize) -> Location {
        let line = self
            .line_starts
            .partition_point(|start| *start <= offset)
            .saturating_sub(1);
        let column = offset - self.line_starts[line];
        Location {
            lineno: u32::try_from(line + 1).unwrap_or(u32::MAX),
            column: u32::from(column) + 1,
            offset: offset.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n\nef");
        let at = |offset: u32| index.location(TextSize::from(offset)).to_string();
        assert_eq!(at(0), "1:1");
        assert_eq!(at(1), "1:2");
        assert_eq!(at(3), "2:1");
        assert_eq!(at(6), "3:1");
        assert_eq!(at(8), "4:2");
    }
}
