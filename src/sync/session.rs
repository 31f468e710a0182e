use tokio::time::Instant;

/// Bookkeeping for one sync pass.
///
/// Tracks request counts, the first error seen and cancellation. Feed
/// requests (XML documents) are counted separately because their completion
/// gates the "feeds updated" signal.
#[derive(Debug)]
pub struct UpdateSession {
    is_load_from_cache_only: bool,
    canceled: bool,
    total_requests: usize,
    pending_requests: usize,
    pending_feed_requests: usize,
    failed_requests: usize,
    cache_sync_active: bool,
    failed_item_count: usize,
    error: Option<String>,
    start_time: Instant,
}

impl UpdateSession {
    pub fn new(is_load_from_cache_only: bool) -> Self {
        Self {
            is_load_from_cache_only,
            canceled: false,
            total_requests: 0,
            pending_requests: 0,
            pending_feed_requests: 0,
            failed_requests: 0,
            cache_sync_active: false,
            failed_item_count: 0,
            error: None,
            start_time: Instant::now(),
        }
    }

    pub fn is_load_from_cache_only(&self) -> bool {
        self.is_load_from_cache_only
    }

    pub fn feed_requests_added(&mut self, count: usize) {
        self.total_requests += count;
        self.pending_requests += count;
        self.pending_feed_requests += count;
    }

    /// Registers a non-feed request (image, description file).
    pub fn request_added(&mut self) {
        self.total_requests += 1;
        self.pending_requests += 1;
    }

    /// Records a completion. The first error wins; cancellation is sticky.
    pub fn request_completed(&mut self, error: Option<String>, canceled: bool, is_feed_request: bool) {
        self.pending_requests = self.pending_requests.saturating_sub(1);
        if is_feed_request {
            self.pending_feed_requests = self.pending_feed_requests.saturating_sub(1);
        }
        if error.is_some() {
            self.failed_requests += 1;
            if self.error.is_none() {
                self.error = error;
            }
        }
        self.canceled |= canceled;
    }

    /// True once every feed document has been fetched and merged.
    pub fn raise_feeds_updated(&self) -> bool {
        self.pending_feed_requests == 0
    }

    /// True once feeds are merged and no content cache sync is running.
    pub fn raise_update_completed(&self) -> bool {
        self.pending_feed_requests == 0 && !self.cache_sync_active
    }

    pub fn set_cache_sync_active(&mut self, active: bool) {
        self.cache_sync_active = active;
    }

    pub fn is_cache_sync_active(&self) -> bool {
        self.cache_sync_active
    }

    /// Folds a finished content cache pass into the session.
    pub fn record_cache_outcome(&mut self, error: Option<String>, canceled: bool, failed_item_count: usize) {
        self.cache_sync_active = false;
        self.failed_item_count += failed_item_count;
        if self.error.is_none() {
            self.error = error;
        }
        self.canceled |= canceled;
    }

    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn total_requests(&self) -> usize {
        self.total_requests
    }

    pub fn pending_requests(&self) -> usize {
        self.pending_requests
    }

    pub fn pending_feed_requests(&self) -> usize {
        self.pending_feed_requests
    }

    pub fn failed_requests(&self) -> usize {
        self.failed_requests
    }

    pub fn failed_item_count(&self) -> usize {
        self.failed_item_count
    }

    /// Share of issued requests that have completed, 0..=100.
    pub fn progress_percent(&self) -> u8 {
        if self.total_requests == 0 {
            return 100;
        }
        let done = self.total_requests - self.pending_requests.min(self.total_requests);
        (done * 100 / self.total_requests) as u8
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}
