//! Incremental revenue bucketing.
//!
//! The caller decides between a full rebuild and an incremental run from the
//! watermark it tracks outside this module, reads purchases from
//! [`RunMode::read_lower_bound`] onwards, and commits the returned
//! [`RevenueUpdate`] (buckets and new watermark) atomically.
//!
//! Buckets at or below the watermark are final and never produced again by an
//! incremental run. With `revisit_open_bucket` the watermark bucket itself is
//! recomputed from all of its events and replaced.

use super::models::{Granularity, RevenueBucket};
use crate::events::{Event, EventType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    /// Recompute every bucket from the full event history.
    FullRebuild,
    /// Extend the table past the last committed bucket.
    Incremental { watermark: DateTime<Utc> },
}

impl RunMode {
    /// A missing watermark means nothing was ever committed: first run.
    pub fn from_watermark(watermark: Option<DateTime<Utc>>) -> Self {
        match watermark {
            Some(watermark) => RunMode::Incremental { watermark },
            None => RunMode::FullRebuild,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match self {
            RunMode::FullRebuild => None,
            RunMode::Incremental { watermark } => Some(*watermark),
        }
    }

    /// Earliest event timestamp the run needs to read.
    pub fn read_lower_bound(
        &self,
        granularity: Granularity,
        revisit_open_bucket: bool,
    ) -> Option<DateTime<Utc>> {
        match self {
            RunMode::FullRebuild => None,
            RunMode::Incremental { watermark } if revisit_open_bucket => Some(*watermark),
            RunMode::Incremental { watermark } => Some(*watermark + granularity.width()),
        }
    }

    fn accepts(&self, bucket_start: DateTime<Utc>, revisit_open_bucket: bool) -> bool {
        match self {
            RunMode::FullRebuild => true,
            RunMode::Incremental { watermark } if revisit_open_bucket => bucket_start >= *watermark,
            RunMode::Incremental { watermark } => bucket_start > *watermark,
        }
    }
}

/// Result of one aggregation run, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct RevenueUpdate {
    pub granularity: Granularity,
    pub mode: RunMode,
    /// Buckets to upsert (incremental) or the whole table (full rebuild),
    /// ordered by `bucket_start`.
    pub buckets: Vec<RevenueBucket>,
    /// Watermark to commit alongside the buckets. Never lower than the
    /// watermark the run started from.
    pub watermark: Option<DateTime<Utc>>,
}

/// Bucket purchase revenue for the buckets the run mode is allowed to touch.
///
/// Non-purchase events and events that fall into finalized buckets are
/// ignored, so handing this function a wider slice than needed is harmless.
pub fn aggregate_revenue(
    granularity: Granularity,
    mode: RunMode,
    events: &[Event],
    revisit_open_bucket: bool,
) -> RevenueUpdate {
    let mut totals: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();

    for event in events {
        if event.event_type != EventType::Purchase {
            continue;
        }
        let bucket_start = granularity.truncate(event.event_timestamp);
        if !mode.accepts(bucket_start, revisit_open_bucket) {
            continue;
        }
        *totals.entry(bucket_start).or_insert(0.0) += event.line_revenue().unwrap_or(0.0);
    }

    let newest = totals.keys().next_back().copied();
    let watermark = match (mode.watermark(), newest) {
        (Some(previous), Some(newest)) => Some(previous.max(newest)),
        (previous, newest) => previous.or(newest),
    };

    RevenueUpdate {
        granularity,
        mode,
        buckets: totals
            .into_iter()
            .map(|(bucket_start, total_revenue)| RevenueBucket {
                bucket_start,
                total_revenue,
            })
            .collect(),
        watermark,
    }
}

/// Apply an update to a bucket table the way the store commits it: a full
/// rebuild replaces the table, an incremental run upserts by `bucket_start`.
pub fn apply_update(existing: &[RevenueBucket], update: &RevenueUpdate) -> Vec<RevenueBucket> {
    let mut table: BTreeMap<DateTime<Utc>, f64> = match update.mode {
        RunMode::FullRebuild => BTreeMap::new(),
        RunMode::Incremental { .. } => existing
            .iter()
            .map(|b| (b.bucket_start, b.total_revenue))
            .collect(),
    };
    for bucket in &update.buckets {
        table.insert(bucket.bucket_start, bucket.total_revenue);
    }
    table
        .into_iter()
        .map(|(bucket_start, total_revenue)| RevenueBucket {
            bucket_start,
            total_revenue,
        })
        .collect()
}
