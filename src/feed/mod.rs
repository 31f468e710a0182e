//! Feed documents: fetching, parsing and conversion into the content tree.
//!
//! - **Fetching**: [`FeedSource`] is the async document boundary;
//!   [`HttpFeedSource`] fetches over HTTP with retries and writes through to a
//!   [`DocumentCache`], [`FileFeedSource`] reads `file://` URIs
//! - **Parsing**: [`parse_document`] builds a namespace-aware element tree
//! - **Conversion**: [`converter`] turns RSS + CSX + SSE + Media RSS
//!   documents into [`crate::model`] types
//!
//! # Example
//!
//! ```ignore
//! use scephoto_sync::feed::{converter, parse_document, FeedSource, HttpFeedSource};
//!
//! let source = HttpFeedSource::new(reqwest::Client::new());
//! let bytes = source.fetch_document(&uri, false).await?;
//! let root = parse_document(&bytes)?;
//! let master = converter::convert_master_feed(&root, &uri);
//! ```

mod cache;
pub mod converter;
mod source;
mod xml;

pub use cache::DocumentCache;
pub use source::{FeedSource, FileFeedSource, HttpFeedSource, SourceError};
pub use xml::{parse_document, Attribute, Element, XmlError};
