//! Sync engine: positional merge, session bookkeeping and the orchestrator.
//!
//! [`DataManager`] runs sync passes against a [`crate::feed::FeedSource`],
//! merging each fetched document into the content tree with
//! [`merge_by_guid`] and reporting through [`SyncEvent`]s. A
//! [`ContentCache`] can be attached to download media after the feeds.

mod manager;
mod media;
mod merge;
mod session;

pub use manager::{DataManager, SyncError, SyncEvent, UpdateReport};
pub use media::{CacheUpdate, ContentCache, MediaCache, NoContentCache};
pub use merge::{merge_by_guid, Keyed, MergeOutcome};
pub use session::UpdateSession;
