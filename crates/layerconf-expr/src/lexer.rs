// crates/layerconf-expr/src/lexer.rs
// ============================================================================
// Module: Expression Lexer
// Description: Tokenizer for validator expressions.
// Purpose: Turn source text into positioned tokens.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! The lexer works byte-wise over ASCII syntax and char-wise inside string
//! literals, so non-ASCII text is only accepted within quotes.

use crate::error::ExprError;

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Lexer token produced from the expression input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Identifier token.
    Ident(&'a str),
    /// Integer literal token.
    Int(&'a str),
    /// String literal token with escapes resolved.
    Str(String),
    /// `true` keyword.
    True,
    /// `false` keyword.
    False,
    /// Logical AND operator.
    And,
    /// Logical OR operator.
    Or,
    /// Logical NOT operator.
    Not,
    /// `==`.
    Eq,
    /// `!=`.
    Ne,
    /// `<`.
    Lt,
    /// `<=`.
    Le,
    /// `>`.
    Gt,
    /// `>=`.
    Ge,
    /// `+`.
    Plus,
    /// `-`.
    Minus,
    /// `*`.
    Star,
    /// `/`.
    Slash,
    /// `%`.
    Percent,
    /// Left parenthesis.
    LParen,
    /// Right parenthesis.
    RParen,
    /// Comma separator.
    Comma,
    /// End-of-input marker.
    Eof,
}

impl Token<'_> {
    /// Formats the token for diagnostics.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Ident(name) => (*name).to_string(),
            Self::Int(raw) => (*raw).to_string(),
            Self::Str(value) => format!("\"{value}\""),
            Self::True => "true".to_string(),
            Self::False => "false".to_string(),
            Self::And => "&&".to_string(),
            Self::Or => "||".to_string(),
            Self::Not => "!".to_string(),
            Self::Eq => "==".to_string(),
            Self::Ne => "!=".to_string(),
            Self::Lt => "<".to_string(),
            Self::Le => "<=".to_string(),
            Self::Gt => ">".to_string(),
            Self::Ge => ">=".to_string(),
            Self::Plus => "+".to_string(),
            Self::Minus => "-".to_string(),
            Self::Star => "*".to_string(),
            Self::Slash => "/".to_string(),
            Self::Percent => "%".to_string(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::Comma => ",".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

/// Token paired with its byte offset.
#[derive(Debug, Clone)]
pub(crate) struct SpannedToken<'a> {
    /// Token value.
    pub(crate) token: Token<'a>,
    /// Byte offset into the input.
    pub(crate) position: usize,
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer for validator expressions.
pub(crate) struct Lexer<'a> {
    /// Source input being tokenized.
    input: &'a str,
    /// Current byte offset into the input.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    pub(crate) const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Lexes the input into a sequence of tokens terminated by [`Token::Eof`].
    pub(crate) fn lex(&mut self) -> Result<Vec<SpannedToken<'a>>, ExprError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while let Some(&ch) = bytes.get(self.offset) {
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                }
                b'(' => tokens.push(self.single(Token::LParen)),
                b')' => tokens.push(self.single(Token::RParen)),
                b',' => tokens.push(self.single(Token::Comma)),
                b'+' => tokens.push(self.single(Token::Plus)),
                b'-' => tokens.push(self.single(Token::Minus)),
                b'*' => tokens.push(self.single(Token::Star)),
                b'/' => tokens.push(self.single(Token::Slash)),
                b'%' => tokens.push(self.single(Token::Percent)),
                b'!' => {
                    if self.peek_byte(bytes) == Some(b'=') {
                        tokens.push(self.double(Token::Ne));
                    } else {
                        tokens.push(self.single(Token::Not));
                    }
                }
                b'<' => {
                    if self.peek_byte(bytes) == Some(b'=') {
                        tokens.push(self.double(Token::Le));
                    } else {
                        tokens.push(self.single(Token::Lt));
                    }
                }
                b'>' => {
                    if self.peek_byte(bytes) == Some(b'=') {
                        tokens.push(self.double(Token::Ge));
                    } else {
                        tokens.push(self.single(Token::Gt));
                    }
                }
                b'=' => {
                    if self.peek_byte(bytes) == Some(b'=') {
                        tokens.push(self.double(Token::Eq));
                    } else {
                        return Err(self.unexpected("=="));
                    }
                }
                b'&' => {
                    if self.peek_byte(bytes) == Some(b'&') {
                        tokens.push(self.double(Token::And));
                    } else {
                        return Err(self.unexpected("&&"));
                    }
                }
                b'|' => {
                    if self.peek_byte(bytes) == Some(b'|') {
                        tokens.push(self.double(Token::Or));
                    } else {
                        return Err(self.unexpected("||"));
                    }
                }
                b'"' | b'\'' => {
                    let token = self.lex_string(char::from(ch))?;
                    tokens.push(token);
                }
                b'0' ..= b'9' => {
                    let start = self.offset;
                    self.consume_while(bytes, |b| b.is_ascii_digit());
                    tokens.push(SpannedToken {
                        token: Token::Int(&self.input[start .. self.offset]),
                        position: start,
                    });
                }
                b'a' ..= b'z' | b'A' ..= b'Z' | b'_' => {
                    let start = self.offset;
                    self.consume_while(bytes, |b| b.is_ascii_alphanumeric() || b == b'_');
                    let slice = &self.input[start .. self.offset];
                    tokens.push(SpannedToken {
                        token: Self::keyword_or_ident(slice),
                        position: start,
                    });
                }
                _ => {
                    return Err(self.unexpected("identifier, literal, or operator"));
                }
            }
        }

        if tokens.is_empty() {
            return Err(ExprError::EmptyInput);
        }

        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Emits a one-byte token and advances past it.
    fn single(&mut self, token: Token<'a>) -> SpannedToken<'a> {
        let position = self.offset;
        self.offset += 1;
        SpannedToken {
            token,
            position,
        }
    }

    /// Emits a two-byte token and advances past it.
    fn double(&mut self, token: Token<'a>) -> SpannedToken<'a> {
        let position = self.offset;
        self.offset += 2;
        SpannedToken {
            token,
            position,
        }
    }

    /// Builds an unexpected-character error at the current offset.
    fn unexpected(&self, expected: &'static str) -> ExprError {
        let found = self.input[self.offset ..]
            .chars()
            .next()
            .map_or_else(|| "end of input".to_string(), |ch| ch.to_string());
        ExprError::UnexpectedToken {
            expected,
            found,
            position: self.offset,
        }
    }

    /// Returns the byte after the current one without advancing.
    fn peek_byte(&self, bytes: &[u8]) -> Option<u8> {
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

    /// Lexes a quoted string literal, resolving escapes.
    fn lex_string(&mut self, quote: char) -> Result<SpannedToken<'a>, ExprError> {
        let start = self.offset;
        let body_start = start + quote.len_utf8();
        let mut out = String::new();
        let mut chars = self.input[body_start ..].char_indices();
        while let Some((index, ch)) = chars.next() {
            if ch == quote {
                self.offset = body_start + index + ch.len_utf8();
                return Ok(SpannedToken {
                    token: Token::Str(out),
                    position: start,
                });
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            let Some((_, escaped)) = chars.next() else {
                break;
            };
            match escaped {
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                '\'' => out.push('\''),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => {
                    return Err(ExprError::InvalidEscape {
                        escape: other,
                        position: body_start + index,
                    });
                }
            }
        }
        Err(ExprError::UnterminatedString {
            position: start,
        })
    }

    /// Maps a slice to a keyword token or identifier token.
    fn keyword_or_ident(slice: &'a str) -> Token<'a> {
        match slice {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Ident(slice),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
