//! Tokenizer for the supported SQL dialect.
//!
//! The lexer never fails. Characters it does not understand become
//! [`Token::Unknown`] and the parser decides how far it can get. Placeholders
//! are numbered here, in source order, so a `?` inside a string literal is
//! part of the literal and never shifts parameter indices.

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Lexer token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token<'a> {
    /// Bare word: identifier or keyword. Keywords are matched by the parser,
    /// case-insensitively.
    Word(&'a str),
    /// `"quoted"`, `` `quoted` `` or `[quoted]` identifier.
    QuotedIdent(&'a str),
    /// `'string'` literal with `''` unescaped.
    Str(String),
    /// Unsigned numeric literal.
    Number(&'a str),
    /// `?` placeholder with its zero-based positional index.
    Placeholder(usize),
    /// `*`
    Star,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `;`
    Semicolon,
    /// `.`
    Dot,
    /// `-`
    Minus,
    /// `=` or `==`
    Eq,
    /// `!=` or `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// Anything else.
    Unknown(char),
    /// End of input.
    Eof,
}

impl Token<'_> {
    /// Whether this token is the keyword `kw` (ASCII case-insensitive).
    pub(crate) fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(kw))
    }

    /// Human-readable form for diagnostics.
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Word(w) | Token::QuotedIdent(w) | Token::Number(w) => (*w).to_string(),
            Token::Str(s) => format!("'{s}'"),
            Token::Placeholder(_) => "?".into(),
            Token::Star => "*".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Semicolon => ";".into(),
            Token::Dot => ".".into(),
            Token::Minus => "-".into(),
            Token::Eq => "=".into(),
            Token::NotEq => "!=".into(),
            Token::Lt => "<".into(),
            Token::Lte => "<=".into(),
            Token::Gt => ">".into(),
            Token::Gte => ">=".into(),
            Token::Unknown(c) => c.to_string(),
            Token::Eof => "end of input".into(),
        }
    }
}

/// Token paired with its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpannedToken<'a> {
    /// Token value.
    pub(crate) token: Token<'a>,
    /// Byte offset into the input.
    pub(crate) position: usize,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

/// Lexer over one SQL string.
pub(crate) struct Lexer<'a> {
    input: &'a str,
    offset: usize,
    placeholders: usize,
}

#[allow(clippy::arithmetic_side_effects)] // offsets never pass the input length
impl<'a> Lexer<'a> {
    pub(crate) const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
            placeholders: 0,
        }
    }

    /// Tokenize the whole input. The last token is always [`Token::Eof`].
    pub(crate) fn lex(mut self) -> Vec<SpannedToken<'a>> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while let Some(&ch) = bytes.get(self.offset) {
            let start = self.offset;
            let token = match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                    continue;
                },
                b'-' if self.peek(bytes) == Some(b'-') => {
                    self.consume_while(bytes, |b| b != b'\n');
                    continue;
                },
                b'/' if self.peek(bytes) == Some(b'*') => {
                    self.skip_block_comment(bytes);
                    continue;
                },
                b'\'' => Token::Str(self.string_literal(bytes)),
                b'"' => self.quoted_ident(bytes, b'"'),
                b'`' => self.quoted_ident(bytes, b'`'),
                b'[' => self.quoted_ident(bytes, b']'),
                b'0'..=b'9' => {
                    self.consume_while(bytes, |b| b.is_ascii_digit());
                    if bytes.get(self.offset) == Some(&b'.')
                        && self.peek(bytes).is_some_and(|b| b.is_ascii_digit())
                    {
                        self.offset += 1;
                        self.consume_while(bytes, |b| b.is_ascii_digit());
                    }
                    Token::Number(&self.input[start..self.offset])
                },
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    self.consume_while(bytes, |b| {
                        b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
                    });
                    Token::Word(&self.input[start..self.offset])
                },
                b'?' => {
                    self.offset += 1;
                    let index = self.placeholders;
                    self.placeholders += 1;
                    Token::Placeholder(index)
                },
                b'=' => self.one_or_two(bytes, b'=', Token::Eq, Token::Eq),
                b'!' if self.peek(bytes) == Some(b'=') => {
                    self.offset += 2;
                    Token::NotEq
                },
                b'<' => match self.peek(bytes) {
                    Some(b'=') => {
                        self.offset += 2;
                        Token::Lte
                    },
                    Some(b'>') => {
                        self.offset += 2;
                        Token::NotEq
                    },
                    _ => {
                        self.offset += 1;
                        Token::Lt
                    },
                },
                b'>' => self.one_or_two(bytes, b'=', Token::Gt, Token::Gte),
                b'*' => self.single(Token::Star),
                b',' => self.single(Token::Comma),
                b'(' => self.single(Token::LParen),
                b')' => self.single(Token::RParen),
                b';' => self.single(Token::Semicolon),
                b'.' => self.single(Token::Dot),
                b'-' => self.single(Token::Minus),
                _ => {
                    let c = self.input[start..].chars().next().unwrap_or('\u{FFFD}');
                    self.offset += c.len_utf8();
                    Token::Unknown(c)
                },
            };
            tokens.push(SpannedToken {
                token,
                position: start,
            });
        }

        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        tokens
    }

    fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.offset += 1;
        token
    }

    fn one_or_two(&mut self, bytes: &[u8], next: u8, one: Token<'a>, two: Token<'a>) -> Token<'a> {
        if self.peek(bytes) == Some(next) {
            self.offset += 2;
            two
        } else {
            self.offset += 1;
            one
        }
    }

    /// Returns the byte after the current one without advancing.
    fn peek(&self, bytes: &[u8]) -> Option<u8> {
        bytes.get(self.offset + 1).copied()
    }

    /// Advances while the condition matches the current byte.
    fn consume_while<F>(&mut self, bytes: &[u8], condition: F)
    where
        F: Fn(u8) -> bool,
    {
        while let Some(&b) = bytes.get(self.offset) {
            if condition(b) {
                self.offset += 1;
            } else {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self, bytes: &[u8]) {
        self.offset += 2;
        while let Some(&b) = bytes.get(self.offset) {
            if b == b'*' && self.peek(bytes) == Some(b'/') {
                self.offset += 2;
                return;
            }
            self.offset += 1;
        }
    }

    /// Reads a `'...'` literal. An unterminated literal runs to end of input.
    fn string_literal(&mut self, bytes: &[u8]) -> String {
        self.offset += 1;
        let mut out = String::new();
        let mut run_start = self.offset;
        while let Some(&b) = bytes.get(self.offset) {
            if b == b'\'' {
                out.push_str(&self.input[run_start..self.offset]);
                if self.peek(bytes) == Some(b'\'') {
                    out.push('\'');
                    self.offset += 2;
                    run_start = self.offset;
                    continue;
                }
                self.offset += 1;
                return out;
            }
            self.offset += 1;
        }
        out.push_str(&self.input[run_start..self.offset]);
        out
    }

    fn quoted_ident(&mut self, bytes: &[u8], close: u8) -> Token<'a> {
        self.offset += 1;
        let start = self.offset;
        self.consume_while(bytes, |b| b != close);
        let ident = &self.input[start..self.offset];
        if bytes.get(self.offset).is_some() {
            self.offset += 1;
        }
        Token::QuotedIdent(ident)
    }
}

/// Tokenize `sql`.
pub(crate) fn tokenize(sql: &str) -> Vec<SpannedToken<'_>> {
    Lexer::new(sql).lex()
}
