//! Message parsing: header splitting and field walking, RFC 822 tokens,
//! transfer encodings, dates, and the pipeline that ties them together.

pub mod date;
pub mod eml;
pub mod header;
pub mod mime;
pub mod span;
pub mod token;

pub use eml::{parse_message, ParseOptions};
