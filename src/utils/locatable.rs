use text_size::TextRange;

use super::{LineIndex, Location};

/// Something with a source range, such as a token or a diagnostic.
pub trait Locatable {
    fn range(&self) -> TextRange;

    /// Line and column of the start of the range.
    fn location(&self, index: &LineIndex) -> Location {
        index.location(self.range().start())
    }
}

impl Locatable for TextRange {
    fn range(&self) -> TextRange {
        *self
    }
}
