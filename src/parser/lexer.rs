//! Lexer for Warden policy source.
//!
//! Produces a flat token stream with source locations. Newlines are not
//! tokens; each token records whether a line break preceded it so the parser
//! can treat newlines as expression separators inside rule bodies.

use crate::location::Location;
use std::fmt;

/// A lexical token kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword (the parser decides by context).
    Ident(String),
    /// Numeric literal, textual form preserved.
    Number(String),
    /// String literal, unescaped.
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Pipe,
    /// `:=`
    Assign,
    /// `=`
    Unify,
    /// `==`
    Equal,
    /// `!=`
    Neq,
    /// `<=`
    Lte,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "{s}"),
            TokenKind::Number(s) => write!(f, "{s}"),
            TokenKind::Str(s) => write!(f, "{s:?}"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Assign => write!(f, ":="),
            TokenKind::Unify => write!(f, "="),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::Neq => write!(f, "!="),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Add => write!(f, "+"),
            TokenKind::Sub => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Eof => write!(f, "<eof>"),
        }
    }
}

/// A token with its location and separator context.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
    /// True when at least one line break separates this token from the
    /// previous one.
    pub newline_before: bool,
}

/// Error produced when the source cannot be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub location: Location,
}

struct Lexer<'a> {
    src: &'a str,
    file: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    row: usize,
    col: usize,
}

/// Tokenize a source file. The final token is always [`TokenKind::Eof`].
pub fn tokenize(file: &str, src: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        src,
        file,
        chars: src.char_indices().collect(),
        pos: 0,
        row: 1,
        col: 1,
    };
    lexer.run()
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut newline_pending = false;

        loop {
            match self.skip_trivia() {
                Trivia::Newline => newline_pending = true,
                Trivia::None => {}
            }
            let Some((offset, c)) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    location: self.location_here(self.src.len()),
                    newline_before: newline_pending,
                });
                return Ok(tokens);
            };

            let start_row = self.row;
            let start_col = self.col;
            let kind = self.next_kind(offset, c)?;
            let end = self.current_offset();
            let location = Location::new(self.file, start_row, start_col, offset)
                .with_text(end, &self.src[offset..end]);
            tokens.push(Token {
                kind,
                location,
                newline_before: newline_pending,
            });
            newline_pending = false;
        }
    }

    fn next_kind(&mut self, offset: usize, c: char) -> Result<TokenKind, LexError> {
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.ident(offset));
        }
        if c.is_ascii_digit() {
            return self.number(offset);
        }
        if c == '"' {
            return self.string();
        }
        self.advance();
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '|' => TokenKind::Pipe,
            '+' => TokenKind::Add,
            '-' => TokenKind::Sub,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            ':' => {
                if self.eat('=') {
                    TokenKind::Assign
                } else {
                    TokenKind::Colon
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::Equal
                } else {
                    TokenKind::Unify
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::Neq
                } else {
                    return Err(self.error("unexpected character `!`"));
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::Lte
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::Gte
                } else {
                    TokenKind::Gt
                }
            }
            other => {
                return Err(self.error(format!("unexpected character `{other}`")));
            }
        };
        Ok(kind)
    }

    fn ident(&mut self, start: usize) -> TokenKind {
        while let Some((_, c)) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Ident(self.src[start..self.current_offset()].to_string())
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, LexError> {
        while matches!(self.peek(), Some((_, c)) if c.is_ascii_digit()) {
            self.advance();
        }
        if matches!(self.peek(), Some((_, '.')))
            && matches!(self.peek_ahead(1), Some((_, c)) if c.is_ascii_digit())
        {
            self.advance();
            while matches!(self.peek(), Some((_, c)) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some((_, 'e' | 'E'))) {
            self.advance();
            if matches!(self.peek(), Some((_, '+' | '-'))) {
                self.advance();
            }
            if !matches!(self.peek(), Some((_, c)) if c.is_ascii_digit()) {
                return Err(self.error("malformed number: missing exponent digits"));
            }
            while matches!(self.peek(), Some((_, c)) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        Ok(TokenKind::Number(
            self.src[start..self.current_offset()].to_string(),
        ))
    }

    fn string(&mut self) -> Result<TokenKind, LexError> {
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.advance();
            match c {
                '"' => return Ok(TokenKind::Str(out)),
                '\n' => return Err(self.error("unterminated string")),
                '\\' => {
                    let Some((_, esc)) = self.peek() else {
                        return Err(self.error("unterminated string"));
                    };
                    self.advance();
                    match esc {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let Some((_, h)) = self.peek() else {
                                    return Err(self.error("malformed unicode escape"));
                                };
                                let Some(d) = h.to_digit(16) else {
                                    return Err(self.error("malformed unicode escape"));
                                };
                                self.advance();
                                code = code * 16 + d;
                            }
                            match char::from_u32(code) {
                                Some(ch) => out.push(ch),
                                None => return Err(self.error("malformed unicode escape")),
                            }
                        }
                        other => {
                            return Err(
                                self.error(format!("unsupported escape sequence `\\{other}`"))
                            );
                        }
                    }
                }
                other => out.push(other),
            }
        }
    }

    /// Skip whitespace and `#` comments, reporting whether a newline was
    /// crossed.
    fn skip_trivia(&mut self) -> Trivia {
        let mut crossed = false;
        loop {
            match self.peek() {
                Some((_, '\n')) => {
                    crossed = true;
                    self.advance();
                }
                Some((_, c)) if c.is_whitespace() => {
                    self.advance();
                }
                Some((_, '#')) => {
                    while let Some((_, c)) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
        if crossed {
            Trivia::Newline
        } else {
            Trivia::None
        }
    }

    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<(usize, char)> {
        self.chars.get(self.pos + n).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if let Some((_, c)) = self.peek() {
            if c == expected {
                self.advance();
                return true;
            }
        }
        false
    }

    fn advance(&mut self) {
        if let Some((_, c)) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                self.row += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn current_offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.src.len(), |(off, _)| *off)
    }

    fn location_here(&self, offset: usize) -> Location {
        Location::new(self.file, self.row, self.col, offset)
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            location: self.location_here(self.current_offset()),
        }
    }
}

enum Trivia {
    None,
    Newline,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize("test.warden", src)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("p[x] = 1.5"),
            vec![
                TokenKind::Ident("p".to_string()),
                TokenKind::LBracket,
                TokenKind::Ident("x".to_string()),
                TokenKind::RBracket,
                TokenKind::Unify,
                TokenKind::Number("1.5".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds(":= == != <= >="),
            vec![
                TokenKind::Assign,
                TokenKind::Equal,
                TokenKind::Neq,
                TokenKind::Lte,
                TokenKind::Gte,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb\"c""#),
            vec![TokenKind::Str("a\nb\"c".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let tokens = tokenize("t", "a # comment\nb").expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::Ident("a".to_string()));
        assert!(!tokens[0].newline_before);
        assert_eq!(tokens[1].kind, TokenKind::Ident("b".to_string()));
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn test_locations() {
        let tokens = tokenize("t.warden", "a\n  bb").expect("tokenize");
        assert_eq!(tokens[1].location.row, 2);
        assert_eq!(tokens[1].location.col, 3);
        assert_eq!(tokens[1].location.text, "bb");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("t", "\"abc").expect_err("should fail");
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            kinds("0 42 3.14 1e10 2.5e-3"),
            vec![
                TokenKind::Number("0".to_string()),
                TokenKind::Number("42".to_string()),
                TokenKind::Number("3.14".to_string()),
                TokenKind::Number("1e10".to_string()),
                TokenKind::Number("2.5e-3".to_string()),
                TokenKind::Eof,
            ]
        );
    }
}
