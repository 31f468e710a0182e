//! Typed content tree for the photo feed.
//!
//! - [`MasterFeedContent`] lists the galleries, each [`PhotoGallery`] lists its
//!   albums, and each [`PhotoAlbum`] holds [`Photo`]s.
//! - [`Revision`] and [`GuidStore`] drive change detection between syncs.
//! - [`TagStore`] interns `media:category` tags into short ids.

mod content;
mod guid_store;
mod revision;
mod tag_store;

pub use content::{
    Channel, FeedContent, FeedItem, FeedKind, Item, MasterFeedContent, Photo, PhotoAlbum,
    PhotoGallery,
};
pub use guid_store::GuidStore;
pub use revision::Revision;
pub use tag_store::{TagId, TagStore};
