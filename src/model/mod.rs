//! Data model: decoded messages and archive records.

pub mod mail;
