//! The compiler error type.

use compact_str::CompactString;
use text_size::TextRange;
use thiserror::Error;

use crate::utils::{Join, Locatable};

use super::{
    ir::VerifyError,
    token::{LexicalError, TokenKind},
};

/// The compiler error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilerError {
    #[error("{error}")]
    Lexical {
        error: LexicalError,
        range: TextRange,
    },
    #[error(
        "unexpected token (expected {}, found {})",
        .expected.iter().join(", "),
        .found,
    )]
    UnexpectedToken {
        expected: Vec<TokenKind>,
        found: TokenKind,
        range: TextRange,
    },
    #[error("unexpected end of file")]
    UnexpectedEof { range: TextRange },
    #[error("undeclared identifier `{name}`")]
    UndeclaredIdentifier {
        name: CompactString,
        range: TextRange,
    },
    #[error("`{name}` is already declared in this scope")]
    DuplicateDeclaration {
        name: CompactString,
        range: TextRange,
    },
    #[error("`{name}` is not a procedure")]
    NotAProcedure {
        name: CompactString,
        range: TextRange,
    },
    #[error("`{name}` is not a variable")]
    NotAVariable {
        name: CompactString,
        range: TextRange,
    },
    #[error("procedure `{name}` takes {expected} argument(s) but {found} were supplied")]
    ArityMismatch {
        name: CompactString,
        expected: usize,
        found: usize,
        range: TextRange,
    },
    #[error("mismatched types (expected {expected}, found {found})")]
    TypeMismatch {
        expected: String,
        found: String,
        range: TextRange,
    },
    #[error("operator {op} cannot be applied to {lhs} and {rhs}")]
    IncompatibleOperands {
        op: TokenKind,
        lhs: String,
        rhs: String,
        range: TextRange,
    },
    #[error("operator {op} cannot be applied to {operand}")]
    InvalidUnaryOperand {
        op: TokenKind,
        operand: String,
        range: TextRange,
    },
    #[error("`{name}` is not an array")]
    NotAnArray {
        name: CompactString,
        range: TextRange,
    },
    #[error("array index must be integer, found {found}")]
    InvalidIndex { found: String, range: TextRange },
    #[error("array lengths must match ({lhs} and {rhs})")]
    ArraySizeMismatch { lhs: u32, rhs: u32, range: TextRange },
    #[error("array must be indexed here")]
    ArrayNotIndexed { range: TextRange },
    #[error("array bound must be a positive integer")]
    InvalidArrayBound { range: TextRange },
    #[error("condition must be bool or integer, found {found}")]
    InvalidCondition { found: String, range: TextRange },
    #[error("return outside procedure")]
    ReturnOutsideProcedure { range: TextRange },
    #[error("{error}")]
    Verify { error: VerifyError, range: TextRange },
}

impl CompilerError {
    /// Fatal errors abort the compilation immediately.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompilerError::UnexpectedEof { .. } | CompilerError::Verify { .. }
        )
    }
}

impl Locatable for CompilerError {
    fn range(&self) -> TextRange {
        match self {
            CompilerError::Lexical { range, .. }
            | CompilerError::UnexpectedToken { range, .. }
            | CompilerError::UnexpectedEof { range }
            | CompilerError::UndeclaredIdentifier { range, .. }
            | CompilerError::DuplicateDeclaration { range, .. }
            | CompilerError::NotAProcedure { range, .. }
            | CompilerError::NotAVariable { range, .. }
            | CompilerError::ArityMismatch { range, .. }
            | CompilerError::TypeMismatch { range, .. }
            | CompilerError::IncompatibleOperands { range, .. }
            | CompilerError::InvalidUnaryOperand { range, .. }
            | CompilerError::NotAnArray { range, .. }
            | CompilerError::InvalidIndex { range, .. }
            | CompilerError::ArraySizeMismatch { range, .. }
            | CompilerError::ArrayNotIndexed { range }
            | CompilerError::InvalidArrayBound { range }
            | CompilerError::InvalidCondition { range, .. }
            | CompilerError::ReturnOutsideProcedure { range }
            | CompilerError::Verify { range, .. } => *range,
        }
    }
}
