//! Tokenizer for dotXSI text files.
//!
//! Produces names, unsigned numbers, raw double-quoted strings and single
//! punctuation characters. Signs are separate `-` tokens; the typed helpers
//! in the parser module fold them back in. `//` comments are skipped.

use thiserror::Error;

/// Errors that can occur during dotXSI parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Unexpected end of file at line {line}")]
    UnexpectedEof { line: usize },

    #[error("Invalid number at line {line}: {text}")]
    InvalidNumber { line: usize, text: String },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Int,
    Float,
    Str,
    Punct(char),
    End,
}

/// One-token-lookahead scanner over a borrowed source.
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    pos_line: usize,

    kind: TokenKind,
    start: usize,
    end: usize,
    line: usize,

    /// No whitespace between the previous token and the current one
    glued: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> ParseResult<Self> {
        let mut scanner = Self {
            src,
            pos: 0,
            pos_line: 1,
            kind: TokenKind::End,
            start: 0,
            end: 0,
            line: 1,
            glued: false,
        };
        scanner.advance()?;
        Ok(scanner)
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Text of the current token (string contents without quotes).
    pub fn text(&self) -> &'a str {
        &self.src[self.start..self.end]
    }

    /// Line of the current token.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_glued(&self) -> bool {
        self.glued
    }

    pub fn at_end(&self) -> bool {
        self.kind == TokenKind::End
    }

    /// Build a syntax error at the current line.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.kind {
            TokenKind::End => ParseError::UnexpectedEof { line: self.line },
            _ => self.error(format!("expected {}, found '{}'", expected, self.text())),
        }
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text() == name
    }

    /// Consume the punctuation if it is next.
    pub fn if_punct(&mut self, c: char) -> ParseResult<bool> {
        if self.is_punct(c) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        if self.if_punct(c)? {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{c}'")))
        }
    }

    /// Consume the keyword if it is next.
    pub fn if_name(&mut self, name: &str) -> ParseResult<bool> {
        if self.is_name(name) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn expect_name(&mut self, name: &str) -> ParseResult<()> {
        if self.if_name(name)? {
            Ok(())
        } else {
            Err(self.unexpected(name))
        }
    }

    pub fn scan_name(&mut self) -> ParseResult<&'a str> {
        if self.kind != TokenKind::Name {
            return Err(self.unexpected("name"));
        }
        let text = self.text();
        self.advance()?;
        Ok(text)
    }

    /// Raw quoted string, no trailing separator.
    pub fn scan_str(&mut self) -> ParseResult<&'a str> {
        if self.kind != TokenKind::Str {
            return Err(self.unexpected("string"));
        }
        let text = self.text();
        self.advance()?;
        Ok(text)
    }

    /// Unsigned integer token.
    pub fn scan_uint(&mut self) -> ParseResult<i64> {
        if self.kind != TokenKind::Int {
            return Err(self.unexpected("integer"));
        }
        let text = self.text();
        let value = text.parse::<i64>().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            text: text.to_string(),
        })?;
        self.advance()?;
        Ok(value)
    }

    /// Unsigned integer or float token.
    pub fn scan_ufloat(&mut self) -> ParseResult<f32> {
        if !matches!(self.kind, TokenKind::Int | TokenKind::Float) {
            return Err(self.unexpected("number"));
        }
        let text = self.text();
        let value = text.parse::<f32>().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            text: text.to_string(),
        })?;
        self.advance()?;
        Ok(value)
    }

    /// Skip a balanced `{ ... }` block, starting at its opening brace.
    pub fn skip_block(&mut self) -> ParseResult<()> {
        self.expect_punct('{')?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.kind {
                TokenKind::End => return Err(ParseError::UnexpectedEof { line: self.line }),
                TokenKind::Punct('{') => depth += 1,
                TokenKind::Punct('}') => depth -= 1,
                _ => {}
            }
            self.advance()?;
        }
        Ok(())
    }

    /// Move to the next token.
    pub fn advance(&mut self) -> ParseResult<()> {
        let before = self.pos;
        self.skip_trivia();
        self.glued = self.pos == before;
        self.line = self.pos_line;

        let rest = &self.src[self.pos..];
        let Some(c) = rest.chars().next() else {
            self.kind = TokenKind::End;
            self.start = self.pos;
            self.end = self.pos;
            return Ok(());
        };

        if c == '"' {
            let body = self.pos + 1;
            let Some(len) = self.src[body..].find('"') else {
                return Err(ParseError::UnexpectedEof { line: self.line });
            };
            self.pos_line += self.src[body..body + len].matches('\n').count();
            self.kind = TokenKind::Str;
            self.start = body;
            self.end = body + len;
            self.pos = body + len + 1;
        } else if c.is_alphabetic() || c == '_' {
            let len = rest
                .char_indices()
                .find(|&(_, ch)| !(ch.is_alphanumeric() || ch == '_'))
                .map_or(rest.len(), |(i, _)| i);
            self.set_token(TokenKind::Name, len);
        } else if c.is_ascii_digit() {
            let (kind, len) = lex_number(rest.as_bytes());
            self.set_token(kind, len);
        } else {
            self.set_token(TokenKind::Punct(c), c.len_utf8());
        }
        Ok(())
    }

    fn set_token(&mut self, kind: TokenKind, len: usize) {
        self.kind = kind;
        self.start = self.pos;
        self.end = self.pos + len;
        self.pos = self.end;
    }

    fn skip_trivia(&mut self) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\n' => {
                    self.pos_line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }
}

/// Length and kind of the number at the start of `bytes` (which begins with a digit).
fn lex_number(bytes: &[u8]) -> (TokenKind, usize) {
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut len = digits(0);
    let mut kind = TokenKind::Int;

    if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
        len += 1 + digits(len + 1);
        kind = TokenKind::Float;
    }

    if matches!(bytes.get(len), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(len + 1), Some(b'+' | b'-')));
        let exponent = digits(len + 1 + sign);
        if exponent > 0 {
            len += 1 + sign + exponent;
            kind = TokenKind::Float;
        }
    }

    (kind, len)
}
