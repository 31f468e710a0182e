//! Utility functions shared by the converter and the feed sources.
//!
//! - **Text cleanup**: strip control characters from feed-supplied strings
//! - **URI resolution**: resolve relative references against a document URI

mod text;
mod uri;

pub use text::{clean_text, strip_control_chars};
pub use uri::resolve_uri;
