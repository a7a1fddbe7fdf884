//! Parser pipeline for one RFC 822 message.
//!
//! Split header from body, walk the header fields, normalize the ones we
//! recognize, then decode the body according to its transfer encoding. The
//! message buffer is rewritten in place and the returned
//! [`DecodedMessage`] borrows from it.

use std::ops::Range;

use tracing::{debug, trace};

use crate::error::{EncodingError, ParseError};
use crate::model::mail::DecodedMessage;
use crate::parser::date::parse_date;
use crate::parser::header::{
    collapse_ws, decode_encoded_words, parse_header_fields, split_header_from_body,
};
use crate::parser::mime::TransferEncoding;
use crate::parser::token::{Token, Tokenizer};

/// Parser behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// When set, an unparsable `Date:` fails the message. Otherwise the date
    /// becomes unknown.
    pub strict_dates: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { strict_dates: true }
    }
}

/// Header fields we keep, as ranges into the message buffer.
#[derive(Debug, Default)]
struct Fields {
    subject: Range<usize>,
    from: Range<usize>,
    to: Range<usize>,
    message_id: Range<usize>,
    in_reply_to: Range<usize>,
}

/// Decode one complete message held in `msg`.
///
/// No partial result is returned on failure.
pub fn parse_message(
    msg: &mut [u8],
    options: ParseOptions,
) -> Result<DecodedMessage<'_>, ParseError> {
    let split = split_header_from_body(msg).ok_or(ParseError::NoHeaderBoundary)?;
    let spans = parse_header_fields(msg, split.header_end)?;
    trace!(fields = spans.len(), "Parsed header block");

    let mut fields = Fields::default();
    let mut date = None;
    let mut transfer_encoding = TransferEncoding::Identity;

    for span in &spans {
        let key = &msg[span.key.clone()];
        let slot = if key.eq_ignore_ascii_case(b"From") {
            &mut fields.from
        } else if key.eq_ignore_ascii_case(b"To") {
            &mut fields.to
        } else if key.eq_ignore_ascii_case(b"Subject") {
            &mut fields.subject
        } else if key.eq_ignore_ascii_case(b"Message-ID") {
            &mut fields.message_id
        } else if key.eq_ignore_ascii_case(b"In-Reply-To") {
            &mut fields.in_reply_to
        } else if key.eq_ignore_ascii_case(b"Date") {
            match parse_date(&mut msg[span.value.clone()]) {
                Ok(d) => date = Some(d),
                Err(e) if options.strict_dates => return Err(e.into()),
                Err(e) => {
                    debug!(error = %e, "Unparsable date, treating as unknown");
                    date = None;
                }
            }
            continue;
        } else if key.eq_ignore_ascii_case(b"Content-Transfer-Encoding") {
            transfer_encoding = read_transfer_encoding(&mut msg[span.value.clone()])?;
            continue;
        } else {
            continue;
        };
        *slot = normalize_value(msg, span.value.clone())?;
    }

    let body_start = split.body_start;
    let end = msg.len();
    let body_len = transfer_encoding.decode_within(msg, body_start..end, body_start)?;
    let body_span = body_start..body_start + body_len;

    let msg: &[u8] = msg;
    Ok(DecodedMessage {
        subject: &msg[fields.subject],
        from: &msg[fields.from],
        to: &msg[fields.to],
        message_id: &msg[fields.message_id],
        in_reply_to: &msg[fields.in_reply_to],
        date,
        transfer_encoding,
        body: &msg[body_span.clone()],
        body_span,
    })
}

/// Collapse whitespace, then expand encoded-words. Returns the new range.
fn normalize_value(msg: &mut [u8], value: Range<usize>) -> Result<Range<usize>, EncodingError> {
    let region = &mut msg[value.clone()];
    let collapsed = collapse_ws(region);
    let decoded = decode_encoded_words(&mut region[..collapsed])?;
    Ok(value.start..value.start + decoded)
}

/// The first token of the value must be a known encoding atom.
fn read_transfer_encoding(value: &mut [u8]) -> Result<TransferEncoding, EncodingError> {
    let mut tok = Tokenizer::new(value);
    match tok.next_token() {
        Ok(Token::Atom(atom)) => TransferEncoding::from_atom(tok.text(&atom)),
        _ => Err(EncodingError::MissingTransferEncoding),
    }
}
