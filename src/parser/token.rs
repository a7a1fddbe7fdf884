//! Lexer for structured header fields (RFC 822 §3.3).
//!
//! Produces atoms, quoted strings and special characters, skipping whitespace
//! and nested comments. Used for the `Date:` grammar and for the
//! `Content-Transfer-Encoding` value.
//!
//! Tokens are index ranges into the buffer being scanned. Quoted strings are
//! unescaped and whitespace-collapsed in place, which is why the tokenizer
//! needs mutable access to the buffer.

use std::ops::Range;

use thiserror::Error;

use crate::parser::header::collapse_ws;
use crate::parser::span::is_ws;

/// One lexical unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// No more input.
    End,
    /// An atom or the content of a quoted string.
    Atom(Range<usize>),
    /// One of `<>[]:;@\,`.
    Special(u8),
}

/// Lexical errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("unterminated quoted string")]
    UnterminatedQuote,
    #[error("unexpected byte 0x{byte:02x} at offset {offset}")]
    UnexpectedByte { offset: usize, byte: u8 },
}

fn is_special(c: u8) -> bool {
    b"<>[]:;@\\,".contains(&c)
}

/// Whether `c` may appear in an atom.
pub fn is_atom(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"!#$%&'*+-/=?^_`{|}~.".contains(&c)
}

/// Cursor over a mutable byte buffer.
#[derive(Debug)]
pub struct Tokenizer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    /// Start scanning at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes of an atom range returned by [`next_token`](Self::next_token).
    pub fn text(&self, range: &Range<usize>) -> &[u8] {
        &self.buf[range.clone()]
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, TokenError> {
        loop {
            let Some(&first) = self.buf.get(self.pos) else {
                return Ok(Token::End);
            };
            if is_ws(first) {
                self.pos += 1;
            } else if first == b'(' {
                self.skip_comment()?;
            } else if is_special(first) {
                self.pos += 1;
                return Ok(Token::Special(first));
            } else if first == b'"' {
                self.pos += 1;
                return self.quoted_string();
            } else if is_atom(first) {
                let start = self.pos;
                while self.buf.get(self.pos).is_some_and(|&c| is_atom(c)) {
                    self.pos += 1;
                }
                return Ok(Token::Atom(start..self.pos));
            } else {
                return Err(TokenError::UnexpectedByte {
                    offset: self.pos,
                    byte: first,
                });
            }
        }
    }

    /// Skip a comment starting at `(`, honoring nesting and backslash escapes.
    fn skip_comment(&mut self) -> Result<(), TokenError> {
        let mut depth = 0usize;
        loop {
            let c = *self
                .buf
                .get(self.pos)
                .ok_or(TokenError::UnterminatedComment)?;
            self.pos += 1;
            match c {
                b'\\' => {
                    if self.pos >= self.buf.len() {
                        return Err(TokenError::UnterminatedComment);
                    }
                    self.pos += 1;
                }
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    /// Unescape a quoted string in place; the opening quote is consumed.
    fn quoted_string(&mut self) -> Result<Token, TokenError> {
        let start = self.pos;
        let mut w = start;
        loop {
            let c = *self
                .buf
                .get(self.pos)
                .ok_or(TokenError::UnterminatedQuote)?;
            self.pos += 1;
            match c {
                b'"' => {
                    let len = collapse_ws(&mut self.buf[start..w]);
                    return Ok(Token::Atom(start..start + len));
                }
                b'\\' => {
                    let escaped = *self
                        .buf
                        .get(self.pos)
                        .ok_or(TokenError::UnterminatedQuote)?;
                    self.pos += 1;
                    self.buf[w] = escaped;
                    w += 1;
                }
                _ => {
                    self.buf[w] = c;
                    w += 1;
                }
            }
        }
    }
}
