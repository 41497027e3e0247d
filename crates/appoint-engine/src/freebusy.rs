//! Free/busy computation over reserved intervals.
//!
//! Sorts the intervals, merges overlapping busy periods, then computes the
//! gaps within a query window. Only time-reserving appointments should be
//! fed in; `Free`-marked ones are the caller's job to exclude.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A merged busy block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A free gap between busy blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Merge overlapping or adjacent intervals, clipped to the window.
///
/// Returns sorted, non-overlapping blocks. Intervals entirely outside the
/// window are discarded.
#[must_use]
pub fn merge_busy(
    intervals: &[(DateTime<Utc>, DateTime<Utc>)],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<BusyBlock> {
    let mut clipped: Vec<(DateTime<Utc>, DateTime<Utc>)> = intervals
        .iter()
        .filter(|(s, e)| *s < window_end && *e > window_start)
        .map(|(s, e)| ((*s).max(window_start), (*e).min(window_end)))
        .collect();

    if clipped.is_empty() {
        return Vec::new();
    }

    clipped.sort_by_key(|&(start, end)| (start, end));

    let mut merged: Vec<BusyBlock> = Vec::new();
    for (start, end) in clipped {
        if let Some(last) = merged.last_mut() {
            if start <= last.end {
                // Overlapping or adjacent — extend the current block.
                last.end = last.end.max(end);
                continue;
            }
        }
        merged.push(BusyBlock { start, end });
    }

    merged
}

/// Free gaps within `[window_start, window_end)` given busy intervals.
///
/// Busy intervals may overlap; they are merged first. Slots come back
/// sorted by start time.
#[must_use]
pub fn free_slots(
    intervals: &[(DateTime<Utc>, DateTime<Utc>)],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<FreeSlot> {
    let merged = merge_busy(intervals, window_start, window_end);

    let mut slots = Vec::new();
    let mut cursor = window_start;

    for block in &merged {
        if cursor < block.start {
            slots.push(FreeSlot {
                start: cursor,
                end: block.start,
                duration_minutes: (block.start - cursor).num_minutes(),
            });
        }
        cursor = cursor.max(block.end);
    }

    // Trailing gap after the last busy block.
    if cursor < window_end {
        slots.push(FreeSlot {
            start: cursor,
            end: window_end,
            duration_minutes: (window_end - cursor).num_minutes(),
        });
    }

    slots
}
