//! Incremental sync and merge engine for CSX/SSE/Media RSS photo feeds.
//!
//! A master feed lists photo galleries, each gallery feed lists albums and
//! each album feed lists photos. [`sync::DataManager`] walks that hierarchy,
//! re-fetching only what changed, and merges the results into a
//! [`model::MasterFeedContent`] tree that keeps node identity across syncs.

pub mod config;
pub mod feed;
pub mod model;
pub mod sync;
pub mod util;
