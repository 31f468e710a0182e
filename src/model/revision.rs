use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// Version marker for a feed item.
///
/// `Sequenced` comes from an SSE `sync/history` entry and is authoritative.
/// `Timestamp` is the best-effort fallback from CSX `lastBuildDate` or the
/// item's `pubDate`, with no sequence tracking.
///
/// # Ordering
///
/// Two sequenced revisions compare by sequence number, then by change date.
/// Two timestamp-only revisions compare by change date. In a mixed comparison
/// the timestamp-only revision is always the lesser one. Comparing dates
/// across kinds would not be transitive, so the kind ranks first.
///
/// Change detection (the is-new flag) uses inequality, not ordering, so a
/// producer that drops its SSE data still marks items as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Revision {
    Sequenced {
        sequence: u64,
        change_date: DateTime<Utc>,
    },
    Timestamp {
        change_date: DateTime<Utc>,
    },
}

impl Revision {
    pub fn sequenced(sequence: u64, change_date: DateTime<Utc>) -> Self {
        Revision::Sequenced {
            sequence,
            change_date,
        }
    }

    pub fn timestamp(change_date: DateTime<Utc>) -> Self {
        Revision::Timestamp { change_date }
    }

    pub fn change_date(&self) -> DateTime<Utc> {
        match self {
            Revision::Sequenced { change_date, .. } | Revision::Timestamp { change_date } => {
                *change_date
            }
        }
    }

    pub fn sequence(&self) -> Option<u64> {
        match self {
            Revision::Sequenced { sequence, .. } => Some(*sequence),
            Revision::Timestamp { .. } => None,
        }
    }

    pub fn is_newer_than(&self, other: &Revision) -> bool {
        self > other
    }
}

impl Default for Revision {
    fn default() -> Self {
        Revision::Timestamp {
            change_date: DateTime::<Utc>::default(),
        }
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Revision::Sequenced {
                    sequence: a,
                    change_date: da,
                },
                Revision::Sequenced {
                    sequence: b,
                    change_date: db,
                },
            ) => a.cmp(b).then_with(|| da.cmp(db)),
            (Revision::Timestamp { change_date: da }, Revision::Timestamp { change_date: db }) => {
                da.cmp(db)
            }
            (Revision::Timestamp { .. }, Revision::Sequenced { .. }) => Ordering::Less,
            (Revision::Sequenced { .. }, Revision::Timestamp { .. }) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
