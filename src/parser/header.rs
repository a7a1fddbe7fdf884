//! RFC 822 header handling: header/body split, field parsing with folding,
//! whitespace collapsing and RFC 2047 encoded-word decoding.
//!
//! All transforms work in place on the message buffer and report the new
//! length of the region they rewrote. None of them ever writes past the
//! position it is reading from.

use std::ops::Range;

use crate::error::{EncodingError, ParseError};
use crate::parser::mime::{decode_base64_within, decode_qprintable_within};
use crate::parser::span::{find, find_byte, is_ws, span_while};

/// Where the header block ends and the body begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    /// Offset of the blank line, i.e. one past the last header newline.
    pub header_end: usize,
    /// Offset of the first body byte.
    pub body_start: usize,
}

/// Locate the first blank line (`\n\n` or `\n\r\n`).
///
/// Returns `None` when the buffer has no blank line; such a message has no
/// parsable header.
pub fn split_header_from_body(msg: &[u8]) -> Option<Split> {
    let mut pos = 0;
    while let Some(nl) = find_byte(&msg[pos..], b'\n') {
        pos += nl + 1;
        match &msg[pos..] {
            [b'\n', ..] => {
                return Some(Split {
                    header_end: pos,
                    body_start: pos + 1,
                })
            }
            [b'\r', b'\n', ..] => {
                return Some(Split {
                    header_end: pos,
                    body_start: pos + 2,
                })
            }
            _ => {}
        }
    }
    None
}

/// Position of one header field inside the message buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpan {
    /// The field name, without the colon.
    pub key: Range<usize>,
    /// The raw value after the colon, up to but excluding the newline that
    /// ends the last line of the field. Fold newlines are kept.
    pub value: Range<usize>,
}

impl FieldSpan {
    /// Case-insensitive comparison of the field name.
    pub fn is(&self, msg: &[u8], name: &str) -> bool {
        msg[self.key.clone()].eq_ignore_ascii_case(name.as_bytes())
    }
}

fn is_key(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

/// Parse the header block `msg[..header_end]` into fields, in order.
///
/// The parser does not interpret field names. Any line that is neither a
/// `key:` start nor a continuation aborts the whole parse.
pub fn parse_header_fields(msg: &[u8], header_end: usize) -> Result<Vec<FieldSpan>, ParseError> {
    let header = &msg[..header_end];
    let mut fields = Vec::new();
    let mut cursor = 0;

    while cursor < header.len() {
        let key_len = span_while(&header[cursor..], is_key);
        if key_len == 0 {
            return Err(ParseError::MalformedField { offset: cursor });
        }
        let key = cursor..cursor + key_len;
        cursor += key_len;
        if header.get(cursor) != Some(&b':') {
            return Err(ParseError::MalformedField { offset: cursor });
        }
        cursor += 1;

        let value_start = cursor;
        let value_end = loop {
            let nl = find_byte(&header[cursor..], b'\n')
                .ok_or(ParseError::UnterminatedField { offset: value_start })?;
            cursor += nl + 1;
            match header.get(cursor) {
                Some(&c) if is_ws(c) && c != b'\n' => continue,
                _ => break cursor - 1,
            }
        };
        fields.push(FieldSpan {
            key,
            value: value_start..value_end,
        });
    }
    Ok(fields)
}

/// Collapse every whitespace run to a single space and drop leading and
/// trailing whitespace. Returns the new length; the result is
/// `buf[..len]`.
pub fn collapse_ws(buf: &mut [u8]) -> usize {
    let mut r = span_while(buf, is_ws);
    let mut w = 0;
    while r < buf.len() {
        buf[w] = buf[r];
        w += 1;
        r += 1;
        let run = span_while(&buf[r..], is_ws);
        if run > 0 {
            r += run;
            if r < buf.len() {
                buf[w] = b' ';
                w += 1;
            }
        }
    }
    w
}

/// Expand RFC 2047 encoded-words (`=?charset?Q|B?payload?=`) in place.
///
/// The input is expected to be whitespace-collapsed already. The charset is
/// ignored and decoded bytes are kept as they are. Whitespace between two
/// adjacent encoded-words is removed; all other text is copied unchanged.
/// Any malformed encoded-word fails the whole value.
pub fn decode_encoded_words(buf: &mut [u8]) -> Result<usize, EncodingError> {
    let mut r = 0;
    let mut w = 0;
    let mut after_word = false;

    while let Some(mark) = find(&buf[r..], b"=?") {
        let mark = r + mark;
        let gap = r..mark;
        if !(after_word && !gap.is_empty() && buf[gap.clone()].iter().all(|&c| is_ws(c))) {
            buf.copy_within(gap.clone(), w);
            w += gap.len();
        }

        let malformed = EncodingError::MalformedEncodedWord { offset: mark };
        let charset_end = mark
            + 2
            + find_byte(&buf[mark + 2..], b'?').ok_or_else(|| malformed.clone())?;
        let encoding = *buf.get(charset_end + 1).ok_or_else(|| malformed.clone())?;
        if buf.get(charset_end + 2) != Some(&b'?') {
            return Err(malformed);
        }
        let payload_start = charset_end + 3;
        let payload_end =
            payload_start + find(&buf[payload_start..], b"?=").ok_or_else(|| malformed.clone())?;
        let payload = payload_start..payload_end;

        let written = match encoding {
            b'Q' | b'q' => {
                for c in &mut buf[payload.clone()] {
                    if *c == b'_' {
                        *c = b' ';
                    }
                }
                decode_qprintable_within(buf, payload, w)?
            }
            b'B' | b'b' => decode_base64_within(buf, payload, w)?,
            other => return Err(EncodingError::UnknownWordEncoding(other)),
        };
        w += written;
        r = payload_end + 2;
        after_word = true;
    }

    let tail = r..buf.len();
    buf.copy_within(tail.clone(), w);
    Ok(w + tail.len())
}
