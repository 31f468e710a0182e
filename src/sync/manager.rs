use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use super::media::{ContentCache, NoContentCache};
use super::session::UpdateSession;
use crate::feed::{converter, parse_document, Element, FeedSource, SourceError};
use crate::model::{MasterFeedContent, Photo, TagId, TagStore};

#[derive(Debug, Error)]
pub enum SyncError {
    /// `update()` or `load_cached_data()` was called while a session is running.
    #[error("An update is already in progress")]
    UpdateInProgress,
}

/// Events raised towards the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    LoadCachedDataStarted,
    LoadCachedDataCompleted {
        error: Option<String>,
        canceled: bool,
    },
    UpdateStarted,
    UpdateProgressChanged {
        percent: u8,
    },
    /// Every feed document of the pass has been fetched and merged; the
    /// navigation tree can be refreshed.
    FeedsUpdated,
    UpdateCompleted {
        error: Option<String>,
        canceled: bool,
        failed_item_count: usize,
    },
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// First error seen during the session.
    pub error: Option<String>,
    pub canceled: bool,
    pub total_requests: usize,
    pub failed_requests: usize,
    /// Media items the content cache failed to sync.
    pub failed_item_count: usize,
    pub elapsed: Duration,
}

impl UpdateReport {
    fn from_session(session: &UpdateSession) -> Self {
        Self {
            error: session.error().map(str::to_string),
            canceled: session.is_canceled(),
            total_requests: session.total_requests(),
            failed_requests: session.failed_requests(),
            failed_item_count: session.failed_item_count(),
            elapsed: session.elapsed(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && !self.canceled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FeedTarget {
    Master,
    Gallery { gallery: String },
    Album { gallery: String, album: String },
}

#[derive(Debug, Clone)]
struct FeedRequest {
    target: FeedTarget,
    uri: Url,
}

#[derive(Debug, Default)]
struct SyncState {
    content: Option<MasterFeedContent>,
    tags: TagStore,
    last_update_failed: bool,
}

/// Clears the in-progress flag when a session ends, including on early return.
struct SessionGuard<'a>(&'a AtomicBool);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives sync passes over the master feed and owns the content tree.
///
/// One session runs at a time. Within a session, fetches are issued
/// concurrently but their completions are applied to the tree one at a time,
/// in completion order, from the session's own future. The tree lock is
/// never held across an `.await`.
///
/// # Recursive fetch protocol
///
/// 1. Fetch and convert the master feed. Apply it only if its change date is
///    newer than the cached tree's, there is no cached tree, or the previous
///    update failed.
/// 2. Merge galleries. Fetch each gallery whose feed item is new or changed,
///    or that has never been loaded, or all of them after a failed update.
///    Reset is-new flags on the rest.
/// 3. Same for albums inside each fetched gallery.
/// 4. Album documents replace the photo list.
pub struct DataManager<S, C = NoContentCache> {
    source: S,
    cache: Option<C>,
    master_feed_uri: Url,
    events: Option<mpsc::Sender<SyncEvent>>,
    state: RwLock<SyncState>,
    updating: AtomicBool,
    cancel_requested: AtomicBool,
    /// Set while the content cache pass runs; cancels are forwarded only then.
    cache_active: AtomicBool,
}

impl<S: FeedSource> DataManager<S, NoContentCache> {
    pub fn new(source: S, master_feed_uri: Url) -> Self {
        Self {
            source,
            cache: None,
            master_feed_uri,
            events: None,
            state: RwLock::new(SyncState::default()),
            updating: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            cache_active: AtomicBool::new(false),
        }
    }
}

impl<S: FeedSource, C: ContentCache> DataManager<S, C> {
    /// Attaches a content cache that runs after the feeds of each update.
    pub fn with_cache<C2: ContentCache>(self, cache: C2) -> DataManager<S, C2> {
        DataManager {
            source: self.source,
            cache: Some(cache),
            master_feed_uri: self.master_feed_uri,
            events: self.events,
            state: self.state,
            updating: self.updating,
            cancel_requested: self.cancel_requested,
            cache_active: self.cache_active,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn master_feed_uri(&self) -> &Url {
        &self.master_feed_uri
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Whether the last session ended with an error or was canceled. The next
    /// update then re-fetches every nested feed.
    pub fn last_update_failed(&self) -> bool {
        self.read_state().last_update_failed
    }

    /// Snapshot of the content tree.
    pub fn content(&self) -> Option<MasterFeedContent> {
        self.read_state().content.clone()
    }

    /// Runs `f` against the content tree without cloning it.
    pub fn with_content<R>(&self, f: impl FnOnce(Option<&MasterFeedContent>) -> R) -> R {
        f(self.read_state().content.as_ref())
    }

    pub fn tag_name(&self, id: TagId) -> Option<String> {
        self.read_state().tags.name(id).map(str::to_string)
    }

    /// Loads the tree from the local document cache only.
    pub async fn load_cached_data(&self) -> Result<UpdateReport, SyncError> {
        let _guard = self.begin_session()?;
        self.emit(SyncEvent::LoadCachedDataStarted);

        let mut session = UpdateSession::new(true);
        self.run_feed_cycle(&mut session, true).await;
        if self.cancel_requested.load(Ordering::SeqCst) {
            session.cancel();
        }

        let report = UpdateReport::from_session(&session);
        if !report.succeeded() {
            // Leave a cleared flag alone on success; a cache load is no proof
            // that the network copy was ever fully merged.
            self.write_state().last_update_failed = true;
        }
        tracing::info!(
            requests = report.total_requests,
            failed = report.failed_requests,
            canceled = report.canceled,
            "Loaded cached data"
        );
        self.emit(SyncEvent::LoadCachedDataCompleted {
            error: report.error.clone(),
            canceled: report.canceled,
        });
        Ok(report)
    }

    /// Runs one full sync pass against the feed source, then the content
    /// cache if one is attached.
    ///
    /// # Errors
    ///
    /// [`SyncError::UpdateInProgress`] when a session is already running.
    /// Fetch and parse failures do not fail the call; they are reported in
    /// the returned [`UpdateReport`] and the `UpdateCompleted` event.
    pub async fn update(&self) -> Result<UpdateReport, SyncError> {
        let _guard = self.begin_session()?;
        self.emit(SyncEvent::UpdateStarted);

        let mut session = UpdateSession::new(false);
        self.run_feed_cycle(&mut session, false).await;
        if self.cancel_requested.load(Ordering::SeqCst) {
            session.cancel();
        }

        if let Some(cache) = &self.cache {
            self.cache_active.store(true, Ordering::SeqCst);
            if !session.is_canceled() && !self.cancel_requested.load(Ordering::SeqCst) {
                let targets = self.with_content(|c| c.map(|c| c.media_uris()).unwrap_or_default());
                let target_count = targets.len();
                for _ in 0..target_count {
                    session.request_added();
                }
                session.set_cache_sync_active(true);
                let outcome = self.run_content_cache(cache, targets).await;

                // The cache may ignore cancellation; the session must not.
                let canceled = outcome.canceled || self.cancel_requested.load(Ordering::SeqCst);
                for _ in 0..target_count {
                    session.request_completed(None, canceled, false);
                }
                session.record_cache_outcome(
                    outcome.error.clone(),
                    canceled,
                    outcome.failed_item_count,
                );
                if outcome.feeds_updated && !session.is_canceled() {
                    tracing::info!("Content cache refreshed feeds, re-reading master feed");
                    self.run_feed_cycle(&mut session, true).await;
                }
            }
            self.cache_active.store(false, Ordering::SeqCst);
        }

        let report = UpdateReport::from_session(&session);
        self.write_state().last_update_failed = !report.succeeded();
        tracing::info!(
            requests = report.total_requests,
            failed = report.failed_requests,
            failed_items = report.failed_item_count,
            canceled = report.canceled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Update completed"
        );
        if session.raise_update_completed() {
            self.emit(SyncEvent::UpdateCompleted {
                error: report.error.clone(),
                canceled: report.canceled,
                failed_item_count: report.failed_item_count,
            });
        }
        Ok(report)
    }

    /// Cancels the running session. Results that arrive afterwards are
    /// discarded; requests already issued are left to the feed source.
    pub fn cancel(&self) {
        if !self.is_updating() {
            tracing::debug!("Cancel requested with no session running");
            return;
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        if let Some(cache) = &self.cache {
            if self.cache_active.load(Ordering::SeqCst) {
                cache.cancel();
            }
        }
        tracing::info!("Update canceled");
    }

    /// Full description text of a photo: the inline description, or the
    /// separate description file when the feed provides one.
    pub async fn photo_description(&self, photo: &Photo) -> Result<String, SourceError> {
        match &photo.description_file_uri {
            Some(uri) => self.source.fetch_text(uri, false).await,
            None => Ok(photo.description.clone()),
        }
    }

    fn begin_session(&self) -> Result<SessionGuard<'_>, SyncError> {
        if self.updating.swap(true, Ordering::AcqRel) {
            tracing::warn!("Update requested while another is in progress");
            return Err(SyncError::UpdateInProgress);
        }
        self.cancel_requested.store(false, Ordering::Release);
        Ok(SessionGuard(&self.updating))
    }

    /// Fetches the master feed and, recursively, every nested feed the
    /// merges decide to refresh. Returns once no feed request is pending.
    async fn run_feed_cycle(&self, session: &mut UpdateSession, local_only: bool) {
        let force = self.read_state().last_update_failed;
        let mut in_flight = FuturesUnordered::new();

        session.feed_requests_added(1);
        in_flight.push(self.fetch(
            FeedRequest {
                target: FeedTarget::Master,
                uri: self.master_feed_uri.clone(),
            },
            local_only,
        ));

        while let Some((request, result)) = in_flight.next().await {
            if self.cancel_requested.load(Ordering::Acquire) && !session.is_canceled() {
                session.cancel();
            }

            let (error, canceled) = if session.is_canceled() {
                tracing::debug!(uri = %request.uri, "Discarding result of canceled session");
                (None, true)
            } else {
                match result {
                    Ok(bytes) => {
                        let follow_ups = self.apply(&request, &bytes, force);
                        session.feed_requests_added(follow_ups.len());
                        for follow_up in follow_ups {
                            in_flight.push(self.fetch(follow_up, local_only));
                        }
                        (None, false)
                    }
                    Err(e) => {
                        tracing::warn!(uri = %request.uri, error = %e, "Feed request failed");
                        (Some(format!("{}: {}", request.uri, e)), false)
                    }
                }
            };

            session.request_completed(error, canceled, true);
            self.emit_progress(session.progress_percent());
            if session.raise_feeds_updated() {
                self.emit(SyncEvent::FeedsUpdated);
            }
        }
    }

    async fn fetch(
        &self,
        request: FeedRequest,
        local_only: bool,
    ) -> (FeedRequest, Result<Vec<u8>, SourceError>) {
        let result = self.source.fetch_document(&request.uri, local_only).await;
        (request, result)
    }

    async fn run_content_cache(&self, cache: &C, targets: Vec<Url>) -> super::media::CacheUpdate {
        let (progress_tx, mut progress_rx) = mpsc::channel::<u8>(16);
        let forward = async {
            while let Some(percent) = progress_rx.recv().await {
                self.emit_progress(percent);
            }
        };
        let (outcome, ()) = tokio::join!(cache.update(targets, progress_tx), forward);
        outcome
    }

    /// Converts a fetched document and merges it into the tree. Returns the
    /// nested feeds that must be fetched next.
    fn apply(&self, request: &FeedRequest, bytes: &[u8], force: bool) -> Vec<FeedRequest> {
        let root = match parse_document(bytes) {
            Ok(root) => root,
            Err(e) => {
                tracing::error!(uri = %request.uri, error = %e, "Unparsable feed document, keeping previous state");
                return Vec::new();
            }
        };

        let mut state = self.write_state();
        match &request.target {
            FeedTarget::Master => apply_master(&mut state, &root, &request.uri, force),
            FeedTarget::Gallery { gallery } => {
                apply_gallery(&mut state, &root, &request.uri, gallery, force)
            }
            FeedTarget::Album { gallery, album } => {
                apply_album(&mut state, &root, &request.uri, gallery, album);
                Vec::new()
            }
        }
    }

    /// Events never block the session. A full channel drops the event, so
    /// receivers should be sized for a whole pass or drained as it runs.
    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    tracing::warn!(event = ?event, "Event channel full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("Event receiver dropped");
                }
            }
        }
    }

    /// Progress ticks are advisory and never block the session.
    fn emit_progress(&self, percent: u8) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(SyncEvent::UpdateProgressChanged { percent });
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SyncState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SyncState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_master(state: &mut SyncState, root: &Element, uri: &Url, force: bool) -> Vec<FeedRequest> {
    let Some(fresh) = converter::convert_master_feed(root, uri) else {
        return Vec::new();
    };
    if let Some(current) = &state.content {
        if !force && fresh.channel.change_date <= current.channel.change_date {
            let requests = unloaded_requests(current);
            tracing::debug!(
                change_date = %fresh.channel.change_date,
                retrying = requests.len(),
                "Master feed unchanged since last sync"
            );
            return requests;
        }
    }

    let content = state.content.get_or_insert_with(MasterFeedContent::default);
    content.merge(fresh);

    let mut requests = Vec::new();
    for (feed, gallery) in content
        .photo_gallery_feeds
        .iter()
        .zip(content.photo_galleries.iter_mut())
    {
        if feed.item.is_new || force || !gallery.is_loaded() {
            requests.push(FeedRequest {
                target: FeedTarget::Gallery {
                    gallery: feed.item.guid.clone(),
                },
                uri: feed.link.clone(),
            });
        } else {
            gallery.reset_is_new();
        }
    }
    tracing::info!(
        galleries = content.photo_galleries.len(),
        refreshing = requests.len(),
        force = force,
        "Applied master feed"
    );
    requests
}

/// Fetches for nodes that are still stubs, such as a gallery whose last
/// document failed to convert. Loaded galleries are walked for stub albums.
fn unloaded_requests(content: &MasterFeedContent) -> Vec<FeedRequest> {
    let mut requests = Vec::new();
    for (feed, gallery) in content
        .photo_gallery_feeds
        .iter()
        .zip(content.photo_galleries.iter())
    {
        if !gallery.is_loaded() {
            requests.push(FeedRequest {
                target: FeedTarget::Gallery {
                    gallery: feed.item.guid.clone(),
                },
                uri: feed.link.clone(),
            });
            continue;
        }
        for (album_feed, album) in gallery
            .photo_album_feeds
            .iter()
            .zip(gallery.photo_albums.iter())
        {
            if !album.is_loaded() {
                requests.push(FeedRequest {
                    target: FeedTarget::Album {
                        gallery: gallery.guid.clone(),
                        album: album_feed.item.guid.clone(),
                    },
                    uri: album_feed.link.clone(),
                });
            }
        }
    }
    requests
}

fn apply_gallery(
    state: &mut SyncState,
    root: &Element,
    uri: &Url,
    gallery_guid: &str,
    force: bool,
) -> Vec<FeedRequest> {
    let Some(fresh) = converter::convert_photo_gallery(root, uri) else {
        return Vec::new();
    };
    let Some(gallery) = state
        .content
        .as_mut()
        .and_then(|c| c.gallery_mut(gallery_guid))
    else {
        tracing::debug!(gallery = %gallery_guid, "Gallery left the master feed, dropping document");
        return Vec::new();
    };

    gallery.merge(fresh);

    let mut requests = Vec::new();
    for (feed, album) in gallery
        .photo_album_feeds
        .iter()
        .zip(gallery.photo_albums.iter_mut())
    {
        if feed.item.is_new || force || !album.is_loaded() {
            requests.push(FeedRequest {
                target: FeedTarget::Album {
                    gallery: gallery_guid.to_string(),
                    album: feed.item.guid.clone(),
                },
                uri: feed.link.clone(),
            });
        } else {
            album.reset_is_new();
        }
    }
    tracing::debug!(
        gallery = %gallery_guid,
        albums = gallery.photo_albums.len(),
        refreshing = requests.len(),
        "Applied photo gallery"
    );
    requests
}

fn apply_album(state: &mut SyncState, root: &Element, uri: &Url, gallery_guid: &str, album_guid: &str) {
    let SyncState { content, tags, .. } = state;
    let Some(fresh) = converter::convert_photo_album(root, uri, tags) else {
        return;
    };
    let Some(album) = content
        .as_mut()
        .and_then(|c| c.gallery_mut(gallery_guid))
        .and_then(|g| g.album_mut(album_guid))
    else {
        tracing::debug!(
            gallery = %gallery_guid,
            album = %album_guid,
            "Album left its gallery, dropping document"
        );
        return;
    };
    album.merge(fresh);
}
