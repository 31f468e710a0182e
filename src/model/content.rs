use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use super::{GuidStore, Revision, TagId};

/// Identity record shared by every entry in a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    pub title: String,
    /// Stable, non-empty key for the same logical entity across syncs.
    pub guid: String,
    pub web_link: Option<Url>,
    pub publish_date: DateTime<Utc>,
    pub revision: Revision,
    pub is_new: bool,
}

/// An item pointing at a nested feed document (a gallery or an album).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub item: Item,
    pub link: Url,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Photo {
    #[serde(flatten)]
    pub item: Item,
    pub description: String,
    pub image_uri: Url,
    pub thumbnail_uri: Option<Url>,
    /// Separate document holding a description too large to inline.
    pub description_file_uri: Option<Url>,
    pub tag_ids: Vec<TagId>,
}

/// Channel-level metadata common to the master feed, galleries and albums.
///
/// `change_date` falls back to `publish_date` when the document has no
/// build date, so it is not guaranteed to be later than `publish_date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Channel {
    pub title: String,
    pub description: String,
    pub link: Option<Url>,
    pub publish_date: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
    #[serde(skip)]
    pub guid_store: GuidStore,
    /// URI of the document this channel was read from; relative child URIs
    /// resolve against it. `None` until a document has been merged in.
    pub base_uri: Option<Url>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhotoAlbum {
    pub guid: String,
    pub channel: Channel,
    pub photos: Vec<Photo>,
}

impl PhotoAlbum {
    /// Empty album keyed only by guid, created when a new album feed item
    /// appears and before its document has been fetched.
    pub fn stub(guid: &str) -> Self {
        Self {
            guid: guid.to_string(),
            ..Self::default()
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.channel.base_uri.is_some()
    }

    pub fn reset_is_new(&mut self) {
        self.channel.guid_store.reset_is_new();
        for photo in &mut self.photos {
            photo.item.is_new = false;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhotoGallery {
    pub guid: String,
    pub channel: Channel,
    pub photo_albums: Vec<PhotoAlbum>,
    /// Album feed items in document order; drives the album merge.
    pub photo_album_feeds: Vec<FeedItem>,
}

impl PhotoGallery {
    pub fn stub(guid: &str) -> Self {
        Self {
            guid: guid.to_string(),
            ..Self::default()
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.channel.base_uri.is_some()
    }

    pub fn album(&self, guid: &str) -> Option<&PhotoAlbum> {
        self.photo_albums.iter().find(|a| a.guid == guid)
    }

    pub fn album_mut(&mut self, guid: &str) -> Option<&mut PhotoAlbum> {
        self.photo_albums.iter_mut().find(|a| a.guid == guid)
    }

    pub fn reset_is_new(&mut self) {
        self.channel.guid_store.reset_is_new();
        for feed in &mut self.photo_album_feeds {
            feed.item.is_new = false;
        }
        for album in &mut self.photo_albums {
            album.reset_is_new();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MasterFeedContent {
    pub channel: Channel,
    pub photo_galleries: Vec<PhotoGallery>,
    pub photo_gallery_feeds: Vec<FeedItem>,
}

impl MasterFeedContent {
    pub fn gallery(&self, guid: &str) -> Option<&PhotoGallery> {
        self.photo_galleries.iter().find(|g| g.guid == guid)
    }

    pub fn gallery_mut(&mut self, guid: &str) -> Option<&mut PhotoGallery> {
        self.photo_galleries.iter_mut().find(|g| g.guid == guid)
    }

    pub fn photos(&self) -> impl Iterator<Item = &Photo> {
        self.photo_galleries
            .iter()
            .flat_map(|g| g.photo_albums.iter())
            .flat_map(|a| a.photos.iter())
    }

    /// Binary content referenced by the tree: images, thumbnails and
    /// description files, deduplicated, in tree order.
    pub fn media_uris(&self) -> Vec<Url> {
        let mut seen = std::collections::HashSet::new();
        let mut uris = Vec::new();
        for photo in self.photos() {
            let candidates = std::iter::once(&photo.image_uri)
                .chain(photo.thumbnail_uri.iter())
                .chain(photo.description_file_uri.iter());
            for uri in candidates {
                if seen.insert(uri.as_str().to_string()) {
                    uris.push(uri.clone());
                }
            }
        }
        uris
    }
}

/// Which level of the feed tree a document describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FeedKind {
    MasterFeed,
    PhotoGallery,
    PhotoAlbum,
}

/// Converted document content, one variant per tree level.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedContent {
    MasterFeed(MasterFeedContent),
    PhotoGallery(PhotoGallery),
    PhotoAlbum(PhotoAlbum),
}

impl FeedContent {
    pub fn kind(&self) -> FeedKind {
        match self {
            FeedContent::MasterFeed(_) => FeedKind::MasterFeed,
            FeedContent::PhotoGallery(_) => FeedKind::PhotoGallery,
            FeedContent::PhotoAlbum(_) => FeedKind::PhotoAlbum,
        }
    }

    pub fn channel(&self) -> &Channel {
        match self {
            FeedContent::MasterFeed(c) => &c.channel,
            FeedContent::PhotoGallery(g) => &g.channel,
            FeedContent::PhotoAlbum(a) => &a.channel,
        }
    }
}
