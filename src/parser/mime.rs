//! Content transfer decoding: quoted-printable and base64.
//!
//! Both decoders work inside one mutable buffer. They read from a source
//! range and write to a destination offset at or before the start of that
//! range. Each output byte is written only after at least one input byte has
//! been consumed, so the write index never overtakes the read index and the
//! decode can run in place.

use std::ops::Range;

use crate::error::EncodingError;
use crate::parser::span::{find_byte, is_ws};

/// Value of the `Content-Transfer-Encoding` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary` or no header: body is used as is.
    #[default]
    Identity,
    /// `quoted-printable`
    QuotedPrintable,
    /// `base64`
    Base64,
}

impl TransferEncoding {
    /// Map a Content-Transfer-Encoding atom (case-insensitive).
    pub fn from_atom(atom: &[u8]) -> Result<Self, EncodingError> {
        const IDENTITY: [&[u8]; 3] = [b"7bit", b"8bit", b"binary"];
        if IDENTITY.iter().any(|name| atom.eq_ignore_ascii_case(name)) {
            Ok(Self::Identity)
        } else if atom.eq_ignore_ascii_case(b"quoted-printable") {
            Ok(Self::QuotedPrintable)
        } else if atom.eq_ignore_ascii_case(b"base64") {
            Ok(Self::Base64)
        } else {
            Err(EncodingError::UnknownTransferEncoding(
                String::from_utf8_lossy(atom).into_owned(),
            ))
        }
    }

    /// Decode `buf[src]` to `buf[dst..]`, returning the number of bytes
    /// written.
    pub fn decode_within(
        self,
        buf: &mut [u8],
        src: Range<usize>,
        dst: usize,
    ) -> Result<usize, EncodingError> {
        match self {
            Self::Identity => {
                let len = src.len();
                buf.copy_within(src, dst);
                Ok(len)
            }
            Self::QuotedPrintable => decode_qprintable_within(buf, src, dst),
            Self::Base64 => decode_base64_within(buf, src, dst),
        }
    }

    /// Short name as written in the log and shown by the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        }
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Decode quoted-printable in place over the whole of `buf`.
///
/// Returns the decoded length; the decoded bytes are `buf[..len]`.
pub fn decode_qprintable(buf: &mut [u8]) -> Result<usize, EncodingError> {
    let len = buf.len();
    decode_qprintable_within(buf, 0..len, 0)
}

/// Decode quoted-printable from `buf[src]` into `buf[dst..]`.
///
/// `=XX` (either hex case) becomes one byte, `=\r\n` and `=\n` are soft
/// line breaks and vanish, any other byte after `=` is an error. The text
/// between escapes is moved down in whole runs.
pub fn decode_qprintable_within(
    buf: &mut [u8],
    src: Range<usize>,
    dst: usize,
) -> Result<usize, EncodingError> {
    debug_assert!(dst <= src.start && src.end <= buf.len());
    let end = src.end;
    let mut r = src.start;
    let mut w = dst;

    while let Some(eq) = find_byte(&buf[r..end], b'=') {
        let eq = r + eq;
        buf.copy_within(r..eq, w);
        w += eq - r;
        r = eq + 1;

        let rest = &buf[r..end];
        let escaped = match rest {
            [hi, lo, ..] => hex_digit(*hi).zip(hex_digit(*lo)),
            _ => None,
        };
        let soft_break = if rest.starts_with(b"\r\n") {
            2
        } else if rest.starts_with(b"\n") {
            1
        } else {
            0
        };

        if let Some((hi, lo)) = escaped {
            buf[w] = hi << 4 | lo;
            w += 1;
            r += 2;
        } else if soft_break > 0 {
            r += soft_break;
        } else {
            return Err(EncodingError::InvalidQuotedPrintable { offset: eq });
        }
    }
    buf.copy_within(r..end, w);
    Ok(w + (end - r) - dst)
}

fn base64_digit(c: u8) -> Option<u32> {
    match c {
        b'A'..=b'Z' => Some(u32::from(c - b'A')),
        b'a'..=b'z' => Some(u32::from(c - b'a') + 26),
        b'0'..=b'9' => Some(u32::from(c - b'0') + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode base64 in place over the whole of `buf`.
pub fn decode_base64(buf: &mut [u8]) -> Result<usize, EncodingError> {
    let len = buf.len();
    decode_base64_within(buf, 0..len, 0)
}

/// Decode base64 from `buf[src]` into `buf[dst..]`.
///
/// Whitespace is skipped, decoding stops at the first `=` or at the end of
/// the range, and incomplete trailing bits are dropped.
pub fn decode_base64_within(
    buf: &mut [u8],
    src: Range<usize>,
    dst: usize,
) -> Result<usize, EncodingError> {
    debug_assert!(dst <= src.start && src.end <= buf.len());
    let mut w = dst;
    let mut acc: u32 = 0;
    let mut bits = 0u32;

    for r in src {
        let c = buf[r];
        if c == b'=' {
            break;
        }
        if is_ws(c) {
            continue;
        }
        let digit = base64_digit(c).ok_or(EncodingError::InvalidBase64 { offset: r, byte: c })?;
        acc = acc << 6 | digit;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            buf[w] = (acc >> bits) as u8;
            w += 1;
            acc &= (1 << bits) - 1;
        }
    }
    Ok(w - dst)
}
