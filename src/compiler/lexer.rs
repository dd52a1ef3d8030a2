//! The lexer.

use std::str::Chars;

use compact_str::CompactString;
use text_size::{TextRange, TextSize};

use super::token::{
    LexicalError, Token,
    TokenKind::{self, *},
    TokenValue, MAX_STRING_LENGTH,
};

/// Peekable iterator over a char sequence.
///
/// Next characters can be peeked via `first` method,
/// and position can be shifted forward via `bump` method.
struct Cursor<'a> {
    /// The input string.
    input: &'a str,
    /// Iterator over chars. Slightly faster than a &str.
    chars: Chars<'a>,
    #[cfg(debug_assertions)]
    prev: char,
}

const EOF_CHAR: char = '\0';

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Cursor<'a> {
        Cursor {
            input,
            chars: input.chars(),
            #[cfg(debug_assertions)]
            prev: EOF_CHAR,
        }
    }

    /// Returns the last eaten symbol (or `'\0'` in release builds).
    /// (For debug assertions only.)
    fn prev(&self) -> char {
        #[cfg(debug_assertions)]
        {
            self.prev
        }

        #[cfg(not(debug_assertions))]
        {
            EOF_CHAR
        }
    }

    /// Peeks the next symbol from the input stream without consuming it.
    /// If requested position doesn't exist, `EOF_CHAR` is returned.
    /// However, getting `EOF_CHAR` doesn't always mean actual end of file,
    /// it should be checked with `is_eof` method.
    fn first(&self) -> char {
        // `.next()` optimizes better than `.nth(0)`
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    /// Checks if there is nothing more to consume.
    fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Returns position of cursor.
    fn pos(&self) -> TextSize {
        TextSize::try_from(self.input.len() - self.chars.as_str().len()).unwrap_or_default()
    }

    /// Moves to the next character.
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;

        #[cfg(debug_assertions)]
        {
            self.prev = c;
        }

        Some(c)
    }

    /// Eats `c` if it matches.
    fn eat(&mut self, c: char) -> bool {
        if self.first() == c && !self.is_eof() {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Eats symbols while predicate returns true or until the end of file is reached.
    fn eat_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while predicate(self.first()) && !self.is_eof() {
            self.bump();
        }
    }
}

/// Converts source text into a stream of tokens on demand.
///
/// After the end of input, or after a `.` outside of a numeric literal,
/// every call to [`Lexer::next_token`] yields an `Eof` token.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            cursor: Cursor::new(input),
            finished: false,
        }
    }

    /// Returns the next non-trivia token.
    pub fn next_token(&mut self) -> Token {
        loop {
            if self.finished {
                return Token::new(Eof, TokenValue::None, TextRange::empty(self.cursor.pos()));
            }
            if let Some(token) = self.cursor.advance_token() {
                if token.kind == Eof {
                    self.finished = true;
                }
                return token;
            }
        }
    }
}

/// Creates an iterator that produces tokens from the input string.
///
/// The final `Eof` token is not yielded.
pub fn tokenize(input: &str) -> impl Iterator<Item = Token> + '_ {
    let mut lexer = Lexer::new(input);
    std::iter::from_fn(move || {
        let token = lexer.next_token();
        if token.kind != Eof {
            Some(token)
        } else {
            None
        }
    })
}

/// True if `c` is valid as a first character of an identifier.
pub fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// True if `c` is valid as a non-first character of an identifier.
pub fn is_id_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// True if `c` may appear between the quotes of a literal.
fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_ascii_whitespace()
        || matches!(
            c,
            '_' | ';' | ':' | '.' | ',' | '\'' | '!' | '?' | '-' | '+' | '*' | '/' | '=' | '<'
                | '>' | '(' | ')' | '[' | ']' | '&' | '|' | '#' | '%' | '@'
        )
}

impl Cursor<'_> {
    /// Parses a token from the input string.
    ///
    /// Returns `None` for trivia (whitespace and comments).
    fn advance_token(&mut self) -> Option<Token> {
        let start = self.pos();
        let Some(first_char) = self.bump() else {
            return Some(Token::new(Eof, TokenValue::None, TextRange::empty(start)));
        };
        let mut value = TokenValue::None;
        let kind = match first_char {
            // Div, comment or block comment.
            '/' => match self.first() {
                '/' => {
                    self.line_comment();
                    return None;
                }
                '*' => {
                    if self.block_comment() {
                        return None;
                    }
                    value = TokenValue::Error(LexicalError::UnterminatedBlockComment);
                    Unknown
                }
                _ => Div,
            },

            c if c.is_ascii_whitespace() => {
                self.eat_while(|c| c.is_ascii_whitespace());
                return None;
            }

            // Identifier or keyword.
            c if is_id_start(c) => {
                let name = self.ident(start);
                match TokenKind::keyword(&name) {
                    Some(True) => {
                        value = TokenValue::Bool(true);
                        True
                    }
                    Some(False) => {
                        value = TokenValue::Bool(false);
                        False
                    }
                    Some(keyword) => keyword,
                    None => {
                        value = TokenValue::Str(name);
                        Ident
                    }
                }
            }

            // Numeric literal.
            '0'..='9' => {
                let (kind, v) = self.number(start);
                value = v;
                kind
            }

            '"' => {
                let (kind, v) = self.string();
                value = v;
                kind
            }

            '\'' => {
                let (kind, v) = self.char_literal();
                value = v;
                kind
            }

            // The program-final period.
            '.' => Eof,

            // Two-char tokens.
            ':' if self.eat('=') => Assign,
            '=' if self.eat('=') => Eq,
            '!' if self.eat('=') => NotEq,
            '<' if self.eat('=') => LtEq,
            '>' if self.eat('=') => GtEq,

            // One-symbol tokens.
            ':' => Colon,
            '<' => Lt,
            '>' => Gt,
            '&' => And,
            '|' => Or,
            ';' => SemiColon,
            ',' => Comma,
            '(' => OpenParen,
            ')' => CloseParen,
            '[' => OpenBracket,
            ']' => CloseBracket,
            '+' => Add,
            '-' => Sub,
            '*' => Mul,

            // Unknown character.
            c => {
                value = TokenValue::Error(LexicalError::InvalidChar(c));
                Unknown
            }
        };
        let end = self.pos();
        Some(Token::new(kind, value, TextRange::new(start, end)))
    }

    fn line_comment(&mut self) {
        debug_assert!(self.prev() == '/' && self.first() == '/');
        self.bump();
        self.eat_while(|c| c != '\n');
    }

    /// Skips a (possibly nested) block comment. Returns false if it is unterminated.
    fn block_comment(&mut self) -> bool {
        debug_assert!(self.prev() == '/' && self.first() == '*');
        self.bump();

        let mut depth = 1usize;
        while let Some(c) = self.bump() {
            match c {
                '/' if self.eat('*') => {
                    depth += 1;
                }
                '*' if self.eat('/') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => (),
            }
        }
        depth == 0
    }

    fn ident(&mut self, start: TextSize) -> CompactString {
        debug_assert!(is_id_start(self.prev()));
        self.eat_while(is_id_continue);
        let range = TextRange::new(start, self.pos());
        CompactString::from(self.input[range].to_ascii_lowercase())
    }

    fn number(&mut self, start: TextSize) -> (TokenKind, TokenValue) {
        debug_assert!(self.prev().is_ascii_digit());
        self.eat_while(|c| c.is_ascii_digit());
        if self.eat('.') {
            self.eat_while(|c| c.is_ascii_digit());
            let text = &self.input[TextRange::new(start, self.pos())];
            let text = text.strip_suffix('.').unwrap_or(text);
            // A run of ascii digits with at most one period always parses.
            let v = text.parse::<f32>().unwrap_or_default();
            (Float, TokenValue::Float(v))
        } else {
            let text = &self.input[TextRange::new(start, self.pos())];
            match text.parse::<i32>() {
                Ok(v) => (Int, TokenValue::Int(v)),
                Err(_) => (Unknown, TokenValue::Error(LexicalError::IntOutOfRange)),
            }
        }
    }

    fn string(&mut self) -> (TokenKind, TokenValue) {
        debug_assert!(self.prev() == '"');
        let mut s = CompactString::default();
        let mut too_long = false;
        while is_literal_char(self.first()) && !self.is_eof() {
            let c = self.first();
            self.bump();
            if s.len() < MAX_STRING_LENGTH {
                s.push(c);
            } else {
                too_long = true;
            }
        }
        if !self.eat('"') {
            return (Unknown, TokenValue::Error(LexicalError::UnterminatedStr));
        }
        if too_long {
            return (Unknown, TokenValue::Error(LexicalError::StrTooLong));
        }
        (Str, TokenValue::Str(s))
    }

    fn char_literal(&mut self) -> (TokenKind, TokenValue) {
        debug_assert!(self.prev() == '\'');
        let c = self.first();
        if c == '\'' || !(is_literal_char(c) || c == '"') || self.is_eof() {
            self.eat('\'');
            return (Unknown, TokenValue::Error(LexicalError::InvalidCharLiteral));
        }
        self.bump();
        if self.eat('\'') {
            (Char, TokenValue::Char(c))
        } else {
            (Unknown, TokenValue::Error(LexicalError::InvalidCharLiteral))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{LineIndex, Locatable};

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).map(|token| token.kind).collect()
    }

    macro_rules! check_first_token_value {
        ($input:expr, $value:expr $(,)?) => {
            assert_eq!(Lexer::new($input).next_token().value, $value)
        };
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("PROGRAM Test IS Begin END"),
            vec![Program, Ident, Is, Begin, End]
        );
        check_first_token_value!("MyVar", TokenValue::Str("myvar".into()));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds(":= : == != <= < >= > & | ; , ( ) [ ] + - * /"),
            vec![
                Assign, Colon, Eq, NotEq, LtEq, Lt, GtEq, Gt, And, Or, SemiColon, Comma,
                OpenParen, CloseParen, OpenBracket, CloseBracket, Add, Sub, Mul, Div
            ]
        );
    }

    #[test]
    fn test_numbers() {
        check_first_token_value!("0", TokenValue::Int(0));
        check_first_token_value!("12345", TokenValue::Int(12345));
        check_first_token_value!("1.5", TokenValue::Float(1.5));
        check_first_token_value!("2.", TokenValue::Float(2.0));
        check_first_token_value!(
            "99999999999",
            TokenValue::Error(LexicalError::IntOutOfRange)
        );
    }

    #[test]
    fn test_literals() {
        check_first_token_value!(r#""hello world""#, TokenValue::Str("hello world".into()));
        check_first_token_value!("'a'", TokenValue::Char('a'));
        check_first_token_value!(
            r#""never closed"#,
            TokenValue::Error(LexicalError::UnterminatedStr)
        );
        let long = format!("\"{}\"", "x".repeat(MAX_STRING_LENGTH + 1));
        check_first_token_value!(&long, TokenValue::Error(LexicalError::StrTooLong));
    }

    #[test]
    fn test_comments() {
        assert_eq!(kinds("a // b c\n d"), vec![Ident, Ident]);
        assert_eq!(kinds("a /* b /* nested */ c */ d"), vec![Ident, Ident]);
        assert_eq!(kinds("a /* never closed"), vec![Ident, Unknown]);
    }

    #[test]
    fn test_period_terminates() {
        assert_eq!(kinds("end program. trailing junk"), vec![End, Program]);
        let mut lexer = Lexer::new("x.");
        assert_eq!(lexer.next_token().kind, Ident);
        assert_eq!(lexer.next_token().kind, Eof);
        assert_eq!(lexer.next_token().kind, Eof);
    }

    #[test]
    fn test_invalid_char() {
        check_first_token_value!("$", TokenValue::Error(LexicalError::InvalidChar('$')));
        assert_eq!(kinds("a = b"), vec![Ident, Unknown, Ident]);
    }

    #[test]
    fn test_token_locations() {
        let input = "program p is\n  variable x : integer;";
        let index = LineIndex::new(input);
        let locations: Vec<_> = tokenize(input)
            .map(|token| token.location(&index).to_string())
            .collect();
        assert_eq!(
            locations,
            vec!["1:1", "1:9", "1:11", "2:3", "2:12", "2:14", "2:16", "2:23"]
        );
    }
}
