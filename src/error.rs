//! Centralized error types for smak.
//!
//! Two layers exist. [`ParseError`] describes why a single message could not
//! be decoded; it is local to that message and never aborts a batch.
//! [`SmakError`] covers everything else (I/O, store corruption, arena
//! exhaustion) and stops the run.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Header/body boundary or header field syntax.
    Structural,
    /// Encoded-words, content transfer decoding.
    Encoding,
    /// `Date:` grammar.
    Date,
}

/// Why a message could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No blank line separates the header block from the body.
    #[error("no blank line separates header from body")]
    NoHeaderBoundary,

    /// A header line does not start with `key:`.
    #[error("malformed header field at offset {offset}")]
    MalformedField { offset: usize },

    /// A header value is not terminated by a newline.
    #[error("unterminated header field at offset {offset}")]
    UnterminatedField { offset: usize },

    /// A header value or the body could not be decoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The `Date:` header does not follow the RFC 822 grammar.
    #[error(transparent)]
    Date(#[from] DateError),
}

impl ParseError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoHeaderBoundary | Self::MalformedField { .. } | Self::UnterminatedField { .. } => {
                ErrorKind::Structural
            }
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Date(_) => ErrorKind::Date,
        }
    }
}

/// Decoding failures in header values and message bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// `=` not followed by two hex digits or a line break.
    #[error("invalid quoted-printable escape at offset {offset}")]
    InvalidQuotedPrintable { offset: usize },

    /// A byte outside the base64 alphabet.
    #[error("invalid base64 byte 0x{byte:02x} at offset {offset}")]
    InvalidBase64 { offset: usize, byte: u8 },

    /// An `=?` that does not open a well-formed encoded-word.
    #[error("malformed encoded-word at offset {offset}")]
    MalformedEncodedWord { offset: usize },

    /// Encoded-word encoding letter other than `Q` or `B`.
    #[error("unknown encoded-word encoding '{}'", char::from(*.0))]
    UnknownWordEncoding(u8),

    /// Content-Transfer-Encoding atom we do not handle.
    #[error("unknown content transfer encoding '{0}'")]
    UnknownTransferEncoding(String),

    /// Content-Transfer-Encoding value without a leading atom.
    #[error("content transfer encoding value is not an atom")]
    MissingTransferEncoding,
}

/// `Date:` header failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    /// The token stream does not match the date grammar.
    #[error("date syntax error: {0}")]
    Syntax(String),

    /// A numeric field is outside its allowed range.
    #[error("date field '{field}' out of range")]
    OutOfRange { field: &'static str },

    /// Month name is not one of the twelve English abbreviations.
    #[error("unknown month name '{0}'")]
    UnknownMonth(String),

    /// Something follows the zone.
    #[error("unexpected input after time zone")]
    TrailingInput,

    /// The fields do not map to a representable instant.
    #[error("date cannot be represented")]
    Unrepresentable,
}

/// All process-level errors produced by the smak library.
#[derive(Error, Debug)]
pub enum SmakError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The directory lacks `new/` or `cur/`.
    #[error("Not a maildir (missing new/ or cur/): {0}")]
    NotAMaildir(PathBuf),

    /// The arena cannot satisfy an allocation. Indicates the configured
    /// capacity is too small for the mail being processed.
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    ArenaExhausted { requested: usize, remaining: usize },

    /// The log has no record terminator after the given offset.
    #[error("central log is corrupt at offset {offset}")]
    CorruptLog { offset: u64 },

    /// A monthly report file has an impossible length or content.
    #[error("corrupt report '{path}': {reason}")]
    CorruptReport { path: PathBuf, reason: String },

    /// A record identifier or value that cannot be used.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A message that the caller required to decode did not.
    #[error("message could not be parsed: {0}")]
    Parse(#[from] ParseError),
}

/// Convenience alias for `Result<T, SmakError>`.
pub type Result<T> = std::result::Result<T, SmakError>;

impl SmakError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
