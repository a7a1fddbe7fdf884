//! Monthly reports: binary format and the per-month report store.

pub mod format;
pub mod report;
