//! Decoded message and archive record types.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::parser::mime::TransferEncoding;

/// Result of running the parser pipeline over one message.
///
/// Borrows the message buffer, which the pipeline has rewritten in place.
/// Text fields are raw decoded bytes: charsets are not converted, so they are
/// usually but not necessarily UTF-8. Absent headers are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage<'a> {
    /// `Subject:`, collapsed and encoded-word decoded.
    pub subject: &'a [u8],
    /// `From:`
    pub from: &'a [u8],
    /// `To:`
    pub to: &'a [u8],
    /// `Message-ID:`
    pub message_id: &'a [u8],
    /// `In-Reply-To:`
    pub in_reply_to: &'a [u8],
    /// `Date:` in UTC, `None` if absent or (in lenient mode) unparsable.
    pub date: Option<DateTime<Utc>>,
    /// `Content-Transfer-Encoding:` that was applied to the body.
    pub transfer_encoding: TransferEncoding,
    /// Position of the decoded body in the message buffer.
    pub body_span: Range<usize>,
    /// The decoded body.
    pub body: &'a [u8],
}

impl<'a> DecodedMessage<'a> {
    /// View this message as a log record filed under `uniq`.
    pub fn to_record(&self, uniq: &'a [u8]) -> LogRecord<'a> {
        LogRecord {
            uniq,
            message_id: self.message_id,
            time: self.date.map(|d| d.timestamp()),
            from: self.from,
            to: self.to,
            in_reply_to: self.in_reply_to,
            subject: self.subject,
        }
    }
}

/// Render opaque header bytes for display.
pub fn lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Identifier of a record in the central log: its byte offset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct MsgId(pub u64);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line of the central log, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord<'a> {
    /// Name of the message in the maildir, also the page name.
    pub uniq: &'a [u8],
    pub message_id: &'a [u8],
    /// Seconds since the Unix epoch, `None` if unknown.
    pub time: Option<i64>,
    pub from: &'a [u8],
    pub to: &'a [u8],
    pub in_reply_to: &'a [u8],
    pub subject: &'a [u8],
}

impl LogRecord<'_> {
    /// The timestamp as a UTC date.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.time.and_then(|t| DateTime::from_timestamp(t, 0))
    }

    /// JSON view used by the CLI.
    pub fn to_json(&self, id: MsgId) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "uniq": lossy(self.uniq),
            "message_id": lossy(self.message_id),
            "date": self.date().map(|d| d.to_rfc3339()),
            "from": lossy(self.from),
            "to": lossy(self.to),
            "in_reply_to": lossy(self.in_reply_to),
            "subject": lossy(self.subject),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_date_roundtrip() {
        let record = LogRecord {
            uniq: b"1700000000.M1P2.host",
            message_id: b"<a@b>",
            time: Some(1_705_307_400),
            from: b"",
            to: b"",
            in_reply_to: b"",
            subject: b"s",
        };
        assert_eq!(
            record.date().unwrap().to_rfc3339(),
            "2024-01-15T08:30:00+00:00"
        );
        let json = record.to_json(MsgId(42));
        assert_eq!(json["id"], 42);
        assert_eq!(json["subject"], "s");
    }

    #[test]
    fn test_decoded_message_to_record() {
        let mut buf = b"Subject: hi\nMessage-ID: <x@y>\nDate: Mon, 15 Jan 2024 10:30:00 +0200\n\nbody".to_vec();
        let msg = crate::parser::parse_message(&mut buf, Default::default()).unwrap();
        let record = msg.to_record(b"m1");
        assert_eq!(record.uniq, b"m1");
        assert_eq!(record.message_id, b"<x@y>");
        assert_eq!(record.subject, b"hi");
        assert_eq!(record.in_reply_to, b"");
        assert_eq!(record.time, Some(1_705_307_400));
    }
}
