//! Export functionality: static HTML pages.

pub mod html;
