//! Binary content sync (images, thumbnails, description files).
//!
//! The orchestrator runs a [`ContentCache`] after all feed documents have
//! been merged and holds back "update completed" until it finishes.
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use url::Url;

use crate::feed::{DocumentCache, FeedSource};

/// Result of one content cache pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheUpdate {
    pub error: Option<String>,
    pub canceled: bool,
    pub failed_item_count: usize,
    /// The cache refreshed feed documents locally; the orchestrator should
    /// re-read the master feed from the local store.
    pub feeds_updated: bool,
}

/// External subsystem that syncs binary content independently of the XML
/// feed documents.
#[allow(async_fn_in_trait)]
pub trait ContentCache {
    /// Syncs `targets`, reporting progress (0..=100) on `progress`.
    async fn update(&self, targets: Vec<Url>, progress: mpsc::Sender<u8>) -> CacheUpdate;

    fn cancel(&self);
}

/// Placeholder for managers without a content cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContentCache;

impl ContentCache for NoContentCache {
    async fn update(&self, _targets: Vec<Url>, _progress: mpsc::Sender<u8>) -> CacheUpdate {
        CacheUpdate::default()
    }

    fn cancel(&self) {}
}

/// Downloads media referenced by the content tree into a [`DocumentCache`].
///
/// Already-cached URIs are skipped, so repeated passes only fetch what is
/// new. Downloads run with bounded concurrency.
pub struct MediaCache<S> {
    source: S,
    cache: DocumentCache,
    concurrency: usize,
    canceled: AtomicBool,
}

impl<S: FeedSource> MediaCache<S> {
    pub fn new(source: S, cache: DocumentCache) -> Self {
        Self {
            source,
            cache,
            concurrency: 4,
            canceled: AtomicBool::new(false),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    async fn sync_one(&self, uri: &Url) -> Result<bool, String> {
        if self.cache.contains(uri).await {
            return Ok(false);
        }
        let bytes = self
            .source
            .fetch_document(uri, false)
            .await
            .map_err(|e| format!("{uri}: {e}"))?;
        self.cache
            .store(uri, &bytes)
            .await
            .map_err(|e| format!("{uri}: {e}"))?;
        Ok(true)
    }
}

enum ItemOutcome {
    Downloaded,
    AlreadyCached,
    Skipped,
    Failed(String),
}

impl<S: FeedSource> ContentCache for MediaCache<S> {
    async fn update(&self, targets: Vec<Url>, progress: mpsc::Sender<u8>) -> CacheUpdate {
        let total = targets.len();
        if total == 0 {
            return CacheUpdate {
                canceled: self.canceled.swap(false, Ordering::AcqRel),
                ..CacheUpdate::default()
            };
        }

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<ItemOutcome> = stream::iter(targets)
            .map(|uri| {
                let completed = &completed;
                let progress = progress.clone();
                async move {
                    let outcome = if self.canceled.load(Ordering::Acquire) {
                        ItemOutcome::Skipped
                    } else {
                        match self.sync_one(&uri).await {
                            Ok(true) => ItemOutcome::Downloaded,
                            Ok(false) => ItemOutcome::AlreadyCached,
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to cache media item");
                                ItemOutcome::Failed(e)
                            }
                        }
                    };
                    let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                    // Progress is advisory; a full channel just drops the tick
                    let _ = progress.try_send((done * 100 / total) as u8);
                    outcome
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // A cancel consumed here never leaks into the next pass.
        let mut update = CacheUpdate {
            canceled: self.canceled.swap(false, Ordering::AcqRel),
            ..CacheUpdate::default()
        };
        let mut downloaded = 0;
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Downloaded => downloaded += 1,
                ItemOutcome::AlreadyCached | ItemOutcome::Skipped => {}
                ItemOutcome::Failed(e) => {
                    update.failed_item_count += 1;
                    update.error.get_or_insert(e);
                }
            }
        }
        tracing::info!(
            total = total,
            downloaded = downloaded,
            failed = update.failed_item_count,
            canceled = update.canceled,
            "Media cache pass finished"
        );
        update
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }
}
