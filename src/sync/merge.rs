//! Positional reconciliation of cached content against freshly fetched feeds.
//!
//! [`merge_by_guid`] is a pure function over owned collections. Nodes whose
//! guid survives are moved, not rebuilt, so their nested state (a gallery's
//! albums, an album's photos) carries over untouched.
use std::collections::BTreeSet;

use crate::model::{
    FeedItem, MasterFeedContent, Photo, PhotoAlbum, PhotoGallery,
};

/// Anything addressable by a feed guid.
pub trait Keyed {
    fn guid(&self) -> &str;
}

impl Keyed for PhotoGallery {
    fn guid(&self) -> &str {
        &self.guid
    }
}

impl Keyed for PhotoAlbum {
    fn guid(&self) -> &str {
        &self.guid
    }
}

impl Keyed for Photo {
    fn guid(&self) -> &str {
        &self.item.guid
    }
}

impl Keyed for FeedItem {
    fn guid(&self) -> &str {
        &self.item.guid
    }
}

#[derive(Debug)]
pub struct MergeOutcome<T> {
    /// Reconciled collection; `items[i]` has the guid of `feeds[i]`.
    pub items: Vec<T>,
    /// Guids that had no existing node and received a fresh stub.
    pub added: Vec<String>,
    /// Existing nodes whose guid no longer appears in the feed list.
    pub removed: Vec<T>,
}

/// Reconciles `old` against the authoritative feed order in `feeds`.
///
/// For each index `i`: keep the node in place if its guid matches
/// `feeds[i]`; otherwise move the matching node from later in the list to
/// `i`; otherwise insert `stub(&feeds[i])`. Whatever is left past the last
/// index is obsolete and removed as a block.
///
/// `feeds` must not contain duplicate guids (the converter guarantees this).
/// Quadratic in the worst case, which is fine for tens of galleries or albums.
pub fn merge_by_guid<T, F>(old: Vec<T>, feeds: &[FeedItem], mut stub: F) -> MergeOutcome<T>
where
    T: Keyed,
    F: FnMut(&FeedItem) -> T,
{
    let mut items = old;
    let mut added = Vec::new();

    for (i, feed) in feeds.iter().enumerate() {
        let guid = feed.guid();
        if items.get(i).is_some_and(|item| item.guid() == guid) {
            continue;
        }
        let later = items
            .iter()
            .skip(i + 1)
            .position(|item| item.guid() == guid);
        match later {
            Some(offset) => {
                let item = items.remove(i + 1 + offset);
                items.insert(i, item);
            }
            None => {
                items.insert(i, stub(feed));
                added.push(guid.to_string());
            }
        }
    }

    let removed = if items.len() > feeds.len() {
        items.split_off(feeds.len())
    } else {
        Vec::new()
    };

    MergeOutcome {
        items,
        added,
        removed,
    }
}

fn mark_feeds(feeds: &mut [FeedItem], changed: &BTreeSet<String>) {
    for feed in feeds {
        feed.item.is_new = changed.contains(&feed.item.guid);
    }
}

impl MasterFeedContent {
    /// Merges a freshly converted master feed into this tree.
    ///
    /// Gallery feed items absent from the previous store, or with a different
    /// revision, are flagged new. Surviving galleries keep their albums.
    /// Returns the guids of the new or changed gallery feed items.
    pub fn merge(&mut self, mut fresh: MasterFeedContent) -> BTreeSet<String> {
        let changed = fresh
            .channel
            .guid_store
            .mark_changed_since(&self.channel.guid_store);
        mark_feeds(&mut fresh.photo_gallery_feeds, &changed);

        self.channel = fresh.channel;
        self.photo_gallery_feeds = fresh.photo_gallery_feeds;

        let outcome = merge_by_guid(
            std::mem::take(&mut self.photo_galleries),
            &self.photo_gallery_feeds,
            |feed| PhotoGallery::stub(&feed.item.guid),
        );
        tracing::debug!(
            galleries = outcome.items.len(),
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            changed = changed.len(),
            "Merged master feed"
        );
        self.photo_galleries = outcome.items;
        changed
    }
}

impl PhotoGallery {
    /// Merges a freshly converted gallery document into this node, keeping
    /// this node's guid. Returns the guids of new or changed album feeds.
    pub fn merge(&mut self, mut fresh: PhotoGallery) -> BTreeSet<String> {
        let changed = fresh
            .channel
            .guid_store
            .mark_changed_since(&self.channel.guid_store);
        mark_feeds(&mut fresh.photo_album_feeds, &changed);

        self.channel = fresh.channel;
        self.photo_album_feeds = fresh.photo_album_feeds;

        let outcome = merge_by_guid(
            std::mem::take(&mut self.photo_albums),
            &self.photo_album_feeds,
            |feed| PhotoAlbum::stub(&feed.item.guid),
        );
        tracing::debug!(
            gallery = %self.guid,
            albums = outcome.items.len(),
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            "Merged photo gallery"
        );
        self.photo_albums = outcome.items;
        changed
    }
}

impl PhotoAlbum {
    /// Replaces the photos wholesale; photo lists are rebuilt by consumers, so
    /// there is no identity to preserve. Returns the guids of new or changed
    /// photos.
    pub fn merge(&mut self, mut fresh: PhotoAlbum) -> BTreeSet<String> {
        let changed = fresh
            .channel
            .guid_store
            .mark_changed_since(&self.channel.guid_store);
        for photo in &mut fresh.photos {
            photo.item.is_new = changed.contains(&photo.item.guid);
        }
        self.channel = fresh.channel;
        self.photos = fresh.photos;
        tracing::debug!(
            album = %self.guid,
            photos = self.photos.len(),
            changed = changed.len(),
            "Merged photo album"
        );
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Channel, Item, Revision};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use url::Url;

    fn feed(guid: &str) -> FeedItem {
        feed_rev(guid, 1)
    }

    fn feed_rev(guid: &str, seq: u64) -> FeedItem {
        FeedItem {
            item: Item {
                title: guid.to_uppercase(),
                guid: guid.to_string(),
                revision: Revision::sequenced(
                    seq,
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                ),
                ..Item::default()
            },
            link: Url::parse(&format!("http://example.com/{guid}.xml")).unwrap(),
        }
    }

    /// Gallery carrying a marker album so tests can tell existing nodes from stubs.
    fn existing(guid: &str) -> PhotoGallery {
        let mut gallery = PhotoGallery::stub(guid);
        gallery.photo_albums.push(PhotoAlbum::stub(&format!("{guid}-album")));
        gallery
    }

    fn guids<T: Keyed>(items: &[T]) -> Vec<&str> {
        items.iter().map(Keyed::guid).collect()
    }

    fn feeds(guids: &[&str]) -> Vec<FeedItem> {
        guids.iter().map(|g| feed(g)).collect()
    }

    #[test]
    fn test_identical_order_keeps_everything() {
        let old = vec![existing("a"), existing("b")];
        let outcome = merge_by_guid(old, &feeds(&["a", "b"]), |f| PhotoGallery::stub(&f.item.guid));
        assert_eq!(guids(&outcome.items), vec!["a", "b"]);
        assert!(outcome.added.is_empty());
        assert!(outcome.removed.is_empty());
        assert!(outcome.items.iter().all(|g| g.photo_albums.len() == 1));
    }

    #[test]
    fn test_obsolete_trailing_removal() {
        let old = vec![existing("a"), existing("b"), existing("c"), existing("d")];
        let outcome = merge_by_guid(old, &feeds(&["c", "a"]), |f| PhotoGallery::stub(&f.item.guid));

        assert_eq!(guids(&outcome.items), vec!["c", "a"]);
        // Both survivors are the existing nodes, not stubs
        assert_eq!(outcome.items[0].photo_albums[0].guid, "c-album");
        assert_eq!(outcome.items[1].photo_albums[0].guid, "a-album");
        assert!(outcome.added.is_empty());

        let mut removed = guids(&outcome.removed);
        removed.sort();
        assert_eq!(removed, vec!["b", "d"]);
    }

    #[test]
    fn test_new_guid_gets_stub() {
        let old = vec![existing("a")];
        let outcome = merge_by_guid(old, &feeds(&["new", "a"]), |f| PhotoGallery::stub(&f.item.guid));
        assert_eq!(guids(&outcome.items), vec!["new", "a"]);
        assert!(outcome.items[0].photo_albums.is_empty());
        assert_eq!(outcome.items[1].photo_albums[0].guid, "a-album");
        assert_eq!(outcome.added, vec!["new".to_string()]);
    }

    #[test]
    fn test_empty_feed_list_removes_all() {
        let old = vec![existing("a"), existing("b")];
        let outcome = merge_by_guid(old, &[], |f| PhotoGallery::stub(&f.item.guid));
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.removed.len(), 2);
    }

    #[test]
    fn test_reposition_preserves_nested_state() {
        let mut moved = existing("b");
        moved.channel.title = "Loaded gallery".to_string();
        let old = vec![existing("a"), moved];

        let outcome = merge_by_guid(old, &feeds(&["b", "a"]), |f| PhotoGallery::stub(&f.item.guid));
        assert_eq!(outcome.items[0].channel.title, "Loaded gallery");
        assert_eq!(outcome.items[0].photo_albums[0].guid, "b-album");
    }

    #[test]
    fn test_master_merge_marks_new_and_changed_feeds() {
        let mut content = MasterFeedContent::default();
        let mut first = MasterFeedContent::default();
        for f in [feed_rev("g1", 1), feed_rev("g2", 1)] {
            first.channel.guid_store.insert(&f.item.guid, f.item.revision);
            first.photo_gallery_feeds.push(f);
        }
        let changed = content.merge(first);
        assert_eq!(changed.len(), 2);
        assert!(content.photo_gallery_feeds.iter().all(|f| f.item.is_new));
        assert_eq!(guids(&content.photo_galleries), vec!["g1", "g2"]);

        // Existing gallery state survives a second merge
        content.photo_galleries[1].channel.title = "loaded".to_string();

        let mut second = MasterFeedContent::default();
        for f in [feed_rev("g2", 1), feed_rev("g1", 2)] {
            second.channel.guid_store.insert(&f.item.guid, f.item.revision);
            second.photo_gallery_feeds.push(f);
        }
        let changed = content.merge(second);
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["g1".to_string()]);
        assert_eq!(guids(&content.photo_galleries), vec!["g2", "g1"]);
        assert_eq!(content.photo_galleries[0].channel.title, "loaded");
        assert!(!content.photo_gallery_feeds[0].item.is_new);
        assert!(content.photo_gallery_feeds[1].item.is_new);
    }

    #[test]
    fn test_gallery_merge_keeps_guid() {
        let mut gallery = PhotoGallery::stub("g1");
        let mut fresh = PhotoGallery {
            channel: Channel {
                title: "Summer".to_string(),
                ..Channel::default()
            },
            ..PhotoGallery::default()
        };
        let f = feed("a1");
        fresh.channel.guid_store.insert("a1", f.item.revision);
        fresh.photo_album_feeds.push(f);

        let changed = gallery.merge(fresh);
        assert_eq!(gallery.guid, "g1");
        assert_eq!(gallery.channel.title, "Summer");
        assert_eq!(guids(&gallery.photo_albums), vec!["a1"]);
        assert!(changed.contains("a1"));
    }

    #[test]
    fn test_album_merge_replaces_photos_and_marks_new() {
        let photo = |guid: &str, seq: u64| Photo {
            item: Item {
                guid: guid.to_string(),
                revision: Revision::sequenced(seq, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                ..Item::default()
            },
            description: String::new(),
            image_uri: Url::parse(&format!("http://example.com/{guid}.jpg")).unwrap(),
            thumbnail_uri: None,
            description_file_uri: None,
            tag_ids: Vec::new(),
        };
        let build = |photos: Vec<Photo>| {
            let mut album = PhotoAlbum::default();
            for p in photos {
                album.channel.guid_store.insert(&p.item.guid, p.item.revision);
                album.photos.push(p);
            }
            album
        };

        let mut album = PhotoAlbum::stub("a1");
        album.merge(build(vec![photo("p1", 1), photo("p2", 1)]));
        assert!(album.photos.iter().all(|p| p.item.is_new));

        let changed = album.merge(build(vec![photo("p2", 1), photo("p3", 1)]));
        assert_eq!(album.guid, "a1");
        assert_eq!(guids(&album.photos), vec!["p2", "p3"]);
        assert!(!album.photos[0].item.is_new);
        assert!(album.photos[1].item.is_new);
        assert_eq!(changed.len(), 1);
    }

    fn guid_lists() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
        let pool = prop::sample::subsequence(
            (0..12).map(|i| format!("g{i}")).collect::<Vec<_>>(),
            0..12,
        );
        (pool.clone().prop_shuffle(), pool.prop_shuffle())
    }

    proptest! {
        #[test]
        fn prop_merge_follows_feed_order((old, new) in guid_lists()) {
            let old_nodes: Vec<PhotoGallery> = old.iter().map(|g| existing(g)).collect();
            let new_feeds: Vec<FeedItem> = new.iter().map(|g| feed(g)).collect();

            let outcome = merge_by_guid(old_nodes, &new_feeds, |f| PhotoGallery::stub(&f.item.guid));

            prop_assert_eq!(outcome.items.len(), new.len());
            for (item, guid) in outcome.items.iter().zip(&new) {
                prop_assert_eq!(&item.guid, guid);
                // Existing nodes carry their marker album; stubs are empty
                prop_assert_eq!(!item.photo_albums.is_empty(), old.contains(guid));
            }
            for guid in &outcome.added {
                prop_assert!(!old.contains(guid));
            }
            prop_assert_eq!(outcome.items.len() + outcome.removed.len(), old.len() + outcome.added.len());
        }
    }
}
