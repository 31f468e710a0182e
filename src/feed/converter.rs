//! Converts parsed RSS 2.0 documents (with CSX, SSE and Media RSS extensions)
//! into the typed content tree.
//!
//! Validation problems never surface as errors. Structural failures (no
//! `rss/channel`, missing required channel fields) make the conversion return
//! `None`, which callers treat as "no update, keep the previous state".
//! Item-level failures drop the item and are logged.
use chrono::{DateTime, Utc};
use url::Url;

use super::xml::Element;
use crate::model::{
    Channel, FeedContent, FeedItem, FeedKind, Item, MasterFeedContent, Photo, PhotoAlbum,
    PhotoGallery, Revision, TagStore,
};
use crate::util::{clean_text, resolve_uri};

pub const CSX_NS: &str = "http://schemas.microsoft.com/rss/2007/contentsyncextensions";
pub const SSE_NS: &str = "http://feedsync.org/2007/feedsync";
pub const MRSS_NS: &str = "http://search.yahoo.com/mrss";
/// Spelling used by most Media RSS producers; treated as [`MRSS_NS`].
const MRSS_NS_SLASH: &str = "http://search.yahoo.com/mrss/";

/// Converts a document of the given kind.
pub fn convert(
    kind: FeedKind,
    root: &Element,
    source: &Url,
    tags: &mut TagStore,
) -> Option<FeedContent> {
    match kind {
        FeedKind::MasterFeed => convert_master_feed(root, source).map(FeedContent::MasterFeed),
        FeedKind::PhotoGallery => {
            convert_photo_gallery(root, source).map(FeedContent::PhotoGallery)
        }
        FeedKind::PhotoAlbum => {
            convert_photo_album(root, source, tags).map(FeedContent::PhotoAlbum)
        }
    }
}

/// Converts the master feed: one nested-feed item per gallery.
pub fn convert_master_feed(root: &Element, source: &Url) -> Option<MasterFeedContent> {
    let (mut channel, channel_el) = read_channel(root, source)?;
    let photo_gallery_feeds = read_feed_items(channel_el, &mut channel);
    tracing::debug!(
        source = %source,
        galleries = photo_gallery_feeds.len(),
        "Converted master feed"
    );
    Some(MasterFeedContent {
        channel,
        photo_galleries: Vec::new(),
        photo_gallery_feeds,
    })
}

/// Converts a gallery document: one nested-feed item per album.
///
/// The returned gallery has an empty guid; the guid belongs to the master
/// feed item that links to this document.
pub fn convert_photo_gallery(root: &Element, source: &Url) -> Option<PhotoGallery> {
    let (mut channel, channel_el) = read_channel(root, source)?;
    let photo_album_feeds = read_feed_items(channel_el, &mut channel);
    tracing::debug!(
        source = %source,
        albums = photo_album_feeds.len(),
        "Converted photo gallery"
    );
    Some(PhotoGallery {
        guid: String::new(),
        channel,
        photo_albums: Vec::new(),
        photo_album_feeds,
    })
}

/// Converts an album document into its photos, interning tags into `tags`.
pub fn convert_photo_album(
    root: &Element,
    source: &Url,
    tags: &mut TagStore,
) -> Option<PhotoAlbum> {
    let (mut channel, channel_el) = read_channel(root, source)?;
    let mut photos = Vec::new();
    for item_el in channel_el.children_named(None, "item") {
        let Some(item) = read_item(item_el, &channel) else {
            continue;
        };
        let Some(photo) = read_photo(item_el, item, &channel, tags) else {
            continue;
        };
        if !channel
            .guid_store
            .insert(&photo.item.guid, photo.item.revision)
        {
            tracing::error!(
                source = %source,
                guid = %photo.item.guid,
                "Duplicate photo guid, keeping first occurrence"
            );
            continue;
        }
        photos.push(photo);
    }
    tracing::debug!(source = %source, photos = photos.len(), "Converted photo album");
    Some(PhotoAlbum {
        guid: String::new(),
        channel,
        photos,
    })
}

fn read_channel<'a>(root: &'a Element, source: &Url) -> Option<(Channel, &'a Element)> {
    let Some(channel_el) = root
        .is(None, "rss")
        .then(|| root.child(None, "channel"))
        .flatten()
    else {
        tracing::error!(source = %source, "Document has no rss/channel element");
        return None;
    };

    let required = |name: &str| {
        let value = channel_el.child_text(None, name).map(clean_text);
        if value.is_none() {
            tracing::error!(source = %source, field = name, "Channel is missing a required field");
        }
        value
    };
    let title = required("title");
    let description = required("description");
    let link = required("link");
    let (title, description, link) = (title?, description?, link?);

    let link = match resolve_uri(Some(source), &link) {
        Ok(link) => link,
        Err(e) => {
            tracing::error!(source = %source, link = %link, error = %e, "Invalid channel link");
            return None;
        }
    };

    let publish_date = channel_el
        .child_text(None, "pubDate")
        .and_then(|d| parse_date(d, "pubDate", source.as_str()))
        .unwrap_or_default();
    let change_date = channel_el
        .child_text(None, "lastBuildDate")
        .or_else(|| channel_el.child_text(Some(CSX_NS), "lastBuildDate"))
        .and_then(|d| parse_date(d, "lastBuildDate", source.as_str()))
        .unwrap_or(publish_date);

    let channel = Channel {
        title,
        description,
        link: Some(link),
        publish_date,
        change_date,
        guid_store: Default::default(),
        base_uri: Some(source.clone()),
    };
    Some((channel, channel_el))
}

/// Reads the nested-feed items of a master or gallery channel, registering
/// each accepted guid in the channel's store.
fn read_feed_items(channel_el: &Element, channel: &mut Channel) -> Vec<FeedItem> {
    let mut feeds = Vec::new();
    for item_el in channel_el.children_named(None, "item") {
        let Some(item) = read_item(item_el, channel) else {
            continue;
        };
        let Some(target) = flagged_link(item_el, "nestedFeed", &item.guid) else {
            tracing::debug!(guid = %item.guid, "Item is not a nested feed, skipping");
            continue;
        };
        let link = match resolve_uri(channel.base_uri.as_ref(), target) {
            Ok(link) => link,
            Err(e) => {
                tracing::error!(guid = %item.guid, link = %target, error = %e, "Invalid nested feed link");
                continue;
            }
        };
        if !channel.guid_store.insert(&item.guid, item.revision) {
            tracing::error!(guid = %item.guid, "Duplicate feed item guid, keeping first occurrence");
            continue;
        }
        feeds.push(FeedItem { item, link });
    }
    feeds
}

/// Reads the common item fields. Returns `None` for invalid or deleted items.
fn read_item(item_el: &Element, channel: &Channel) -> Option<Item> {
    let Some(title) = item_el.child_text(None, "title").map(clean_text) else {
        tracing::error!(channel = %channel.title, "Item is missing a title");
        return None;
    };
    let guid = item_el
        .child_text(None, "guid")
        .map(clean_text)
        .unwrap_or_default();
    if guid.is_empty() {
        tracing::error!(channel = %channel.title, title = %title, "Item is missing a guid");
        return None;
    }

    let publish_date = item_el
        .child_text(None, "pubDate")
        .and_then(|d| parse_date(d, "pubDate", &guid))
        .unwrap_or(channel.publish_date);

    let Some(revision) = read_revision(item_el, &guid, publish_date) else {
        tracing::debug!(guid = %guid, "Item is marked deleted, excluding");
        return None;
    };

    let web_link = item_el.child_text(None, "link").and_then(|link| {
        resolve_uri(channel.base_uri.as_ref(), link)
            .map_err(|e| {
                tracing::warn!(guid = %guid, link = %link, error = %e, "Ignoring invalid item link");
            })
            .ok()
    });

    Some(Item {
        title,
        guid,
        web_link,
        publish_date,
        revision,
        is_new: false,
    })
}

/// Derives the item revision.
///
/// SSE history wins when present: the entry with the highest `sequence`
/// gives a sequenced revision dated by its `when`. Otherwise the revision is
/// timestamp-only, from `csx:lastBuildDate` or the publish date. Returns
/// `None` when the item is marked `deleted`.
fn read_revision(item_el: &Element, guid: &str, publish_date: DateTime<Utc>) -> Option<Revision> {
    if let Some(sync) = item_el.child(Some(SSE_NS), "sync") {
        if sync
            .attr(None, "deleted")
            .is_some_and(|v| parse_bool(v, "deleted", guid))
        {
            return None;
        }

        let mut latest: Option<(u64, &Element)> = None;
        for history in sync.children_named(Some(SSE_NS), "history") {
            let sequence = history
                .attr(None, "sequence")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|s| *s > 0);
            let Some(sequence) = sequence else {
                tracing::warn!(guid = %guid, "Ignoring SSE history entry without a valid sequence");
                continue;
            };
            if latest.map_or(true, |(best, _)| sequence > best) {
                latest = Some((sequence, history));
            }
        }

        if let Some((sequence, history)) = latest {
            let when = history
                .attr(None, "when")
                .and_then(|w| parse_date(w, "when", guid))
                .unwrap_or_else(|| {
                    tracing::warn!(guid = %guid, sequence = sequence, "SSE history has no usable date, using publish date");
                    publish_date
                });
            return Some(Revision::sequenced(sequence, when));
        }
    }

    let change_date = item_el
        .child_text(Some(CSX_NS), "lastBuildDate")
        .and_then(|d| parse_date(d, "lastBuildDate", guid))
        .unwrap_or(publish_date);
    Some(Revision::timestamp(change_date))
}

fn read_photo(item_el: &Element, item: Item, channel: &Channel, tags: &mut TagStore) -> Option<Photo> {
    let base = channel.base_uri.as_ref();
    let resolve = |field: &str, reference: &str| match resolve_uri(base, reference) {
        Ok(uri) => Some(uri),
        Err(e) => {
            tracing::error!(guid = %item.guid, field = field, uri = %reference, error = %e, "Invalid photo URI, dropping photo");
            None
        }
    };

    let Some(image) = media_child(item_el, "content").and_then(|c| c.attr(None, "url")) else {
        tracing::error!(guid = %item.guid, "Photo has no media:content url, dropping photo");
        return None;
    };
    let image_uri = resolve("media:content", image)?;

    let thumbnail_uri = match media_child(item_el, "thumbnail").and_then(|t| t.attr(None, "url")) {
        Some(thumb) => Some(resolve("media:thumbnail", thumb)?),
        None => None,
    };

    let description_file_uri = match flagged_link(item_el, "descriptionFile", &item.guid) {
        Some(target) => Some(resolve("csx:link", target)?),
        None => None,
    };

    let mut tag_ids = Vec::new();
    for category in media_children(item_el, "category") {
        for tag in category.text.split_whitespace() {
            if let Some(id) = tags.intern(tag) {
                if !tag_ids.contains(&id) {
                    tag_ids.push(id);
                }
            }
        }
    }

    let description = item_el
        .child_text(None, "description")
        .map(clean_text)
        .unwrap_or_default();

    Some(Photo {
        item,
        description,
        image_uri,
        thumbnail_uri,
        description_file_uri,
        tag_ids,
    })
}

/// Target of the first `csx:link` whose `flag` attribute is true. The target
/// is the `href` attribute, falling back to the element text.
fn flagged_link<'a>(item_el: &'a Element, flag: &str, guid: &str) -> Option<&'a str> {
    item_el
        .children_named(Some(CSX_NS), "link")
        .find(|link| link.attr(None, flag).is_some_and(|v| parse_bool(v, flag, guid)))
        .map(|link| {
            link.attr(None, "href")
                .unwrap_or(link.text.as_str())
                .trim()
        })
        .filter(|target| !target.is_empty())
}

fn media_children<'a>(item_el: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    item_el.children.iter().filter(move |c| {
        c.name == name && matches!(c.namespace.as_deref(), Some(MRSS_NS) | Some(MRSS_NS_SLASH))
    })
}

fn media_child<'a>(item_el: &'a Element, name: &'a str) -> Option<&'a Element> {
    media_children(item_el, name).next()
}

/// Parses an RFC 2822 (RSS) or RFC 3339 (SSE) date. Malformed dates are
/// logged as warnings and yield `None` so callers can apply their default.
fn parse_date(value: &str, field: &str, context: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            tracing::warn!(field = field, context = %context, value = %value, error = %e, "Malformed date, using default");
        })
        .ok()
}

fn parse_bool(value: &str, field: &str, context: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" => false,
        other => {
            tracing::warn!(field = field, context = %context, value = %other, "Malformed boolean, treating as false");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::xml::parse_document;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn source() -> Url {
        Url::parse("http://photos.example.com/feeds/master.xml").unwrap()
    }

    fn rss(items: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:csx="{CSX_NS}" xmlns:sx="{SSE_NS}" xmlns:media="{MRSS_NS}">
  <channel>
    <title>Family Photos</title>
    <description>All galleries</description>
    <link>http://photos.example.com/</link>
    <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    <lastBuildDate>Fri, 05 Jan 2024 10:00:00 GMT</lastBuildDate>
{items}
  </channel>
</rss>"#
        )
    }

    fn master(items: &str) -> Option<MasterFeedContent> {
        let root = parse_document(rss(items).as_bytes()).unwrap();
        convert_master_feed(&root, &source())
    }

    fn album(items: &str, tags: &mut TagStore) -> Option<PhotoAlbum> {
        let root = parse_document(rss(items).as_bytes()).unwrap();
        convert_photo_album(&root, &source(), tags)
    }

    fn nested_item(guid: &str, extra: &str) -> String {
        format!(
            r#"<item><title>{guid}</title><guid>{guid}</guid>
<pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate>
<csx:link nestedFeed="true" href="{guid}.xml"/>{extra}</item>"#
        )
    }

    #[test]
    fn test_channel_fields() {
        let content = master("").unwrap();
        assert_eq!(content.channel.title, "Family Photos");
        assert_eq!(content.channel.description, "All galleries");
        assert_eq!(
            content.channel.publish_date,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            content.channel.change_date,
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()
        );
        assert_eq!(content.channel.base_uri, Some(source()));
    }

    #[test]
    fn test_change_date_defaults_to_publish_date() {
        let xml = r#"<rss><channel><title>t</title><description>d</description>
<link>http://e.com/</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></channel></rss>"#;
        let root = parse_document(xml.as_bytes()).unwrap();
        let content = convert_master_feed(&root, &source()).unwrap();
        assert_eq!(content.channel.change_date, content.channel.publish_date);
    }

    #[test]
    fn test_missing_channel_returns_none() {
        let root = parse_document(b"<rss version=\"2.0\"></rss>").unwrap();
        assert!(convert_master_feed(&root, &source()).is_none());

        let root = parse_document(b"<feed><channel/></feed>").unwrap();
        assert!(convert_master_feed(&root, &source()).is_none());
    }

    #[test]
    fn test_missing_required_channel_field_returns_none() {
        for missing in ["title", "description", "link"] {
            let fields: String = ["title", "description", "link"]
                .iter()
                .filter(|f| **f != missing)
                .map(|f| format!("<{f}>http://e.com/{f}</{f}>"))
                .collect();
            let xml = format!("<rss><channel>{fields}</channel></rss>");
            let root = parse_document(xml.as_bytes()).unwrap();
            assert!(
                convert_master_feed(&root, &source()).is_none(),
                "channel without {missing} should be rejected"
            );
        }
    }

    #[test]
    fn test_sse_history_picks_highest_sequence() {
        let sync = r#"<sx:sync id="g1" updates="3">
  <sx:history sequence="1" when="2024-01-01T00:00:00Z"/>
  <sx:history sequence="3" when="2024-01-03T00:00:00Z"/>
  <sx:history sequence="2" when="2024-01-02T00:00:00Z"/>
</sx:sync>"#;
        let content = master(&nested_item("g1", sync)).unwrap();
        let revision = content.photo_gallery_feeds[0].item.revision;
        assert_eq!(
            revision,
            Revision::sequenced(3, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_sse_equal_sequences_keep_first() {
        let sync = r#"<sx:sync id="g1">
  <sx:history sequence="4" when="2024-02-01T00:00:00Z"/>
  <sx:history sequence="4" when="2024-02-09T00:00:00Z"/>
</sx:sync>"#;
        let content = master(&nested_item("g1", sync)).unwrap();
        assert_eq!(
            content.photo_gallery_feeds[0].item.revision.change_date(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_sse_history_falls_back_to_csx() {
        let extra = r#"<sx:sync id="g1"><sx:history sequence="abc"/></sx:sync>
<csx:lastBuildDate>Wed, 10 Jan 2024 08:00:00 GMT</csx:lastBuildDate>"#;
        let content = master(&nested_item("g1", extra)).unwrap();
        assert_eq!(
            content.photo_gallery_feeds[0].item.revision,
            Revision::timestamp(Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_csx_last_build_date_revision() {
        let extra = "<csx:lastBuildDate>Wed, 10 Jan 2024 08:00:00 GMT</csx:lastBuildDate>";
        let content = master(&nested_item("g1", extra)).unwrap();
        let revision = content.photo_gallery_feeds[0].item.revision;
        assert_eq!(revision.sequence(), None);
        assert_eq!(
            revision.change_date(),
            Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_revision_defaults_to_publish_date() {
        let content = master(&nested_item("g1", "")).unwrap();
        let item = &content.photo_gallery_feeds[0].item;
        assert_eq!(item.revision, Revision::timestamp(item.publish_date));
        assert_eq!(
            item.publish_date,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_malformed_date_is_recoverable() {
        let xml = r#"<item><title>g</title><guid>g</guid><pubDate>not a date</pubDate>
<csx:link nestedFeed="true" href="g.xml"/></item>"#;
        let content = master(xml).unwrap();
        assert_eq!(content.photo_gallery_feeds.len(), 1);
        // Falls back to the channel publish date
        assert_eq!(
            content.photo_gallery_feeds[0].item.publish_date,
            content.channel.publish_date
        );
    }

    #[test]
    fn test_deleted_item_excluded() {
        let sync = r#"<sx:sync id="g1" deleted="true"><sx:history sequence="9" when="2024-01-03T00:00:00Z"/></sx:sync>"#;
        let items = format!("{}{}", nested_item("g1", sync), nested_item("g2", ""));
        let content = master(&items).unwrap();
        let guids: Vec<_> = content
            .photo_gallery_feeds
            .iter()
            .map(|f| f.item.guid.as_str())
            .collect();
        assert_eq!(guids, vec!["g2"]);
        assert!(!content.channel.guid_store.contains("g1"));
    }

    #[test]
    fn test_duplicate_guid_first_wins() {
        let first = r#"<item><title>First</title><guid>x</guid><csx:link nestedFeed="true" href="a.xml"/></item>"#;
        let second = r#"<item><title>Second</title><guid>x</guid><csx:link nestedFeed="true" href="b.xml"/></item>"#;
        let content = master(&format!("{first}{second}")).unwrap();
        assert_eq!(content.photo_gallery_feeds.len(), 1);
        assert_eq!(content.photo_gallery_feeds[0].item.title, "First");
        assert_eq!(content.channel.guid_store.len(), 1);
    }

    #[test]
    fn test_items_missing_title_or_guid_rejected() {
        let items = r#"<item><guid>no-title</guid><csx:link nestedFeed="true" href="a.xml"/></item>
<item><title>No guid</title><csx:link nestedFeed="true" href="b.xml"/></item>
<item><title>Blank guid</title><guid>  </guid><csx:link nestedFeed="true" href="c.xml"/></item>"#;
        let content = master(items).unwrap();
        assert!(content.photo_gallery_feeds.is_empty());
    }

    #[test]
    fn test_nested_feed_requires_flag() {
        let items = r#"<item><title>leaf</title><guid>leaf</guid><csx:link href="leaf.xml"/></item>
<item><title>off</title><guid>off</guid><csx:link nestedFeed="false" href="off.xml"/></item>
<item><title>plain</title><guid>plain</guid></item>"#;
        let items = format!("{items}{}", nested_item("g1", ""));
        let content = master(&items).unwrap();
        assert_eq!(content.photo_gallery_feeds.len(), 1);
        assert_eq!(
            content.photo_gallery_feeds[0].link.as_str(),
            "http://photos.example.com/feeds/g1.xml"
        );
    }

    #[test]
    fn test_nested_link_from_element_text() {
        let item = r#"<item><title>g</title><guid>g</guid><csx:link nestedFeed="True">http://cdn.example.com/g.xml</csx:link></item>"#;
        let content = master(item).unwrap();
        assert_eq!(
            content.photo_gallery_feeds[0].link.as_str(),
            "http://cdn.example.com/g.xml"
        );
    }

    #[test]
    fn test_photo_fields_and_tags() {
        let mut tags = TagStore::new();
        let item = r#"<item><title>Beach</title><guid>p1</guid>
<description>Sunset at the beach</description>
<link>photos/p1.html</link>
<media:content url="images/p1.jpg"/>
<media:thumbnail url="thumbs/p1.jpg"/>
<media:category>beach sunset beach</media:category>
<csx:link descriptionFile="true" href="text/p1.txt"/>
</item>"#;
        let album = album(item, &mut tags).unwrap();
        assert_eq!(album.photos.len(), 1);
        let photo = &album.photos[0];
        assert_eq!(photo.item.title, "Beach");
        assert_eq!(photo.description, "Sunset at the beach");
        assert_eq!(
            photo.image_uri.as_str(),
            "http://photos.example.com/feeds/images/p1.jpg"
        );
        assert_eq!(
            photo.thumbnail_uri.as_ref().map(Url::as_str),
            Some("http://photos.example.com/feeds/thumbs/p1.jpg")
        );
        assert_eq!(
            photo.description_file_uri.as_ref().map(Url::as_str),
            Some("http://photos.example.com/feeds/text/p1.txt")
        );
        assert_eq!(
            photo.item.web_link.as_ref().map(Url::as_str),
            Some("http://photos.example.com/feeds/photos/p1.html")
        );
        assert_eq!(photo.tag_ids, vec![0, 1]);
        assert_eq!(tags.name(0), Some("beach"));
        assert_eq!(tags.name(1), Some("sunset"));
        assert!(album.channel.guid_store.contains("p1"));
    }

    #[test]
    fn test_media_namespace_with_trailing_slash() {
        let xml = r#"<rss xmlns:m="http://search.yahoo.com/mrss/"><channel><title>a</title>
<description>d</description><link>http://e.com/</link>
<item><title>p</title><guid>p</guid><m:content url="http://e.com/p.jpg"/></item>
</channel></rss>"#;
        let root = parse_document(xml.as_bytes()).unwrap();
        let album = convert_photo_album(&root, &source(), &mut TagStore::new()).unwrap();
        assert_eq!(album.photos.len(), 1);
    }

    #[test]
    fn test_photo_without_image_dropped() {
        let mut tags = TagStore::new();
        let items = r#"<item><title>No image</title><guid>p1</guid></item>
<item><title>Ok</title><guid>p2</guid><media:content url="p2.jpg"/></item>"#;
        let album = album(items, &mut tags).unwrap();
        let guids: Vec<_> = album.photos.iter().map(|p| p.item.guid.as_str()).collect();
        assert_eq!(guids, vec!["p2"]);
    }

    #[test]
    fn test_photo_with_unresolvable_uri_dropped() {
        let mut tags = TagStore::new();
        let items = r#"<item><title>Bad</title><guid>p1</guid><media:content url="http://[::1"/></item>
<item><title>Bad thumb</title><guid>p2</guid><media:content url="ok.jpg"/><media:thumbnail url="http://[bad"/></item>"#;
        let album = album(items, &mut tags).unwrap();
        assert!(album.photos.is_empty());
        assert!(album.channel.guid_store.is_empty());
    }

    #[test]
    fn test_duplicate_photo_guid_first_wins() {
        let mut tags = TagStore::new();
        let items = r#"<item><title>One</title><guid>p</guid><media:content url="1.jpg"/></item>
<item><title>Two</title><guid>p</guid><media:content url="2.jpg"/></item>"#;
        let album = album(items, &mut tags).unwrap();
        assert_eq!(album.photos.len(), 1);
        assert_eq!(album.photos[0].item.title, "One");
    }

    #[test]
    fn test_tags_shared_across_albums() {
        let mut tags = TagStore::new();
        let a = album(
            r#"<item><title>a</title><guid>a</guid><media:content url="a.jpg"/><media:category>paris</media:category></item>"#,
            &mut tags,
        )
        .unwrap();
        let b = album(
            r#"<item><title>b</title><guid>b</guid><media:content url="b.jpg"/><media:category>rome paris</media:category></item>"#,
            &mut tags,
        )
        .unwrap();
        assert_eq!(a.photos[0].tag_ids, vec![0]);
        assert_eq!(b.photos[0].tag_ids, vec![1, 0]);
    }

    #[test]
    fn test_conversion_is_idempotent() {
        let sync = r#"<sx:sync id="g1"><sx:history sequence="2" when="2024-01-03T00:00:00Z"/></sx:sync>"#;
        let items = format!("{}{}", nested_item("g1", sync), nested_item("g2", ""));
        assert_eq!(master(&items), master(&items));
    }

    #[test]
    fn test_convert_dispatches_on_kind() {
        let root = parse_document(rss(&nested_item("a1", "")).as_bytes()).unwrap();
        let mut tags = TagStore::new();
        let content = convert(FeedKind::PhotoGallery, &root, &source(), &mut tags).unwrap();
        assert_eq!(content.kind(), FeedKind::PhotoGallery);
        match content {
            FeedContent::PhotoGallery(gallery) => {
                assert_eq!(gallery.photo_album_feeds.len(), 1);
                assert!(gallery.guid.is_empty());
            }
            other => panic!("Expected gallery, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("TRUE", "f", "c"));
        assert!(parse_bool(" 1 ", "f", "c"));
        assert!(!parse_bool("false", "f", "c"));
        assert!(!parse_bool("yes", "f", "c"));
    }
}
