//! The token.

use std::fmt;

use compact_str::CompactString;
use text_size::TextRange;
use thiserror::Error;

use crate::utils::Locatable;

use self::TokenKind::*;

/// Maximum number of characters in a string literal.
pub const MAX_STRING_LENGTH: usize = 50;

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub range: TextRange,
}

impl Token {
    pub const fn new(kind: TokenKind, value: TokenValue, range: TextRange) -> Self {
        Token { kind, value, range }
    }

    /// The identifier or string payload, or `""`.
    pub fn text(&self) -> &str {
        match &self.value {
            TokenValue::Str(s) => s.as_str(),
            _ => "",
        }
    }
}

impl Locatable for Token {
    fn range(&self) -> TextRange {
        self.range
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            TokenValue::None => write!(f, "{}", self.kind),
            TokenValue::Int(v) => write!(f, "{} {}", self.kind, v),
            TokenValue::Float(v) => write!(f, "{} {}", self.kind, v),
            TokenValue::Bool(v) => write!(f, "{} {}", self.kind, v),
            TokenValue::Char(v) => write!(f, "{} '{}'", self.kind, v),
            TokenValue::Str(v) if self.kind == Ident => write!(f, "{} `{}`", self.kind, v),
            TokenValue::Str(v) => write!(f, "{} \"{}\"", self.kind, v),
            TokenValue::Error(e) => write!(f, "{} ({})", self.kind, e),
        }
    }
}

/// The payload of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Int(i32),
    Float(f32),
    Bool(bool),
    Char(char),
    /// Identifier names (case-folded) and string literal contents.
    Str(CompactString),
    /// Attached to `Unknown` tokens.
    Error(LexicalError),
}

/// What went wrong while scanning an `Unknown` token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexicalError {
    #[error("invalid character {0:?}")]
    InvalidChar(char),
    #[error("unterminated string literal")]
    UnterminatedStr,
    #[error("string literal longer than {MAX_STRING_LENGTH} characters")]
    StrTooLong,
    #[error("invalid character literal")]
    InvalidCharLiteral,
    #[error("block comment did not end properly")]
    UnterminatedBlockComment,
    #[error("integer literal out of range")]
    IntOutOfRange,
}

/// Kind of token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Keywords:
    /// "program"
    Program,
    /// "is"
    Is,
    /// "global"
    Global,
    /// "variable"
    Variable,
    /// "integer"
    IntegerType,
    /// "float"
    FloatType,
    /// "string"
    StringType,
    /// "bool"
    BoolType,
    /// "char"
    CharType,
    /// "procedure"
    Procedure,
    /// "return"
    Return,
    /// "not"
    Not,
    /// "begin"
    Begin,
    /// "end"
    End,
    /// "if"
    If,
    /// "else"
    Else,
    /// "then"
    Then,
    /// "true"
    True,
    /// "false"
    False,
    /// "while"
    While,
    /// "for"
    For,

    // Two-char tokens:
    /// ":="
    Assign,
    /// "=="
    Eq,
    /// "!="
    NotEq,
    /// "<="
    LtEq,
    /// ">="
    GtEq,

    // One-char tokens:
    /// "<"
    Lt,
    /// ">"
    Gt,
    /// "&"
    And,
    /// "|"
    Or,
    /// ";"
    SemiColon,
    /// ":"
    Colon,
    /// ","
    Comma,
    /// "("
    OpenParen,
    /// ")"
    CloseParen,
    /// "["
    OpenBracket,
    /// "]"
    CloseBracket,
    /// "+"
    Add,
    /// "-"
    Sub,
    /// "*"
    Mul,
    /// "/"
    Div,

    // Literals and identifiers:
    Ident,
    Int,
    Float,
    Str,
    Char,

    /// End of input, or the program-final period.
    Eof,
    /// Lexical error.
    Unknown,
}

impl TokenKind {
    /// Looks up a case-folded word in the reserved word table.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "program" => Program,
            "is" => Is,
            "global" => Global,
            "variable" => Variable,
            "integer" => IntegerType,
            "float" => FloatType,
            "string" => StringType,
            "bool" => BoolType,
            "char" => CharType,
            "procedure" => Procedure,
            "return" => Return,
            "not" => Not,
            "begin" => Begin,
            "end" => End,
            "if" => If,
            "else" => Else,
            "then" => Then,
            "true" => True,
            "false" => False,
            "while" => While,
            "for" => For,
            _ => return None,
        })
    }

    /// All reserved words, in table order.
    pub const KEYWORDS: [TokenKind; 21] = [
        Program,
        Is,
        Global,
        Variable,
        IntegerType,
        FloatType,
        StringType,
        BoolType,
        CharType,
        Procedure,
        Return,
        Not,
        Begin,
        End,
        If,
        Else,
        Then,
        True,
        False,
        While,
        For,
    ];

    pub const fn is_type_mark(self) -> bool {
        matches!(self, IntegerType | FloatType | StringType | BoolType)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Program => "program",
            Is => "is",
            Global => "global",
            Variable => "variable",
            IntegerType => "integer",
            FloatType => "float",
            StringType => "string",
            BoolType => "bool",
            CharType => "char",
            Procedure => "procedure",
            Return => "return",
            Not => "not",
            Begin => "begin",
            End => "end",
            If => "if",
            Else => "else",
            Then => "then",
            True => "true",
            False => "false",
            While => "while",
            For => "for",
            Assign => ":=",
            Eq => "==",
            NotEq => "!=",
            LtEq => "<=",
            GtEq => ">=",
            Lt => "<",
            Gt => ">",
            And => "&",
            Or => "|",
            SemiColon => ";",
            Colon => ":",
            Comma => ",",
            OpenParen => "(",
            CloseParen => ")",
            OpenBracket => "[",
            CloseBracket => "]",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Ident => "identifier",
            Int => "integer literal",
            Float => "float literal",
            Str => "string literal",
            Char => "character literal",
            Eof => "end of file",
            Unknown => "unknown token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ident | Int | Float | Str | Char | Eof | Unknown => f.write_str(self.name()),
            _ => write!(f, "`{}`", self.name()),
        }
    }
}
