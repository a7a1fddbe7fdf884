//! `smak`: a mailing list web archiver.
//!
//! This crate provides the core library for decoding RFC 822 messages in
//! place, keeping the central log and monthly reports, and publishing the
//! archive as static HTML pages.

pub mod arena;
pub mod config;
pub mod error;
pub mod export;
pub mod index;
pub mod maildir;
pub mod model;
pub mod parser;
pub mod store;
