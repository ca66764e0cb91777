//! Explicit-boundary regrouping.
//!
//! Users pass the instants at which acquisition was interrupted (or any other
//! cut point). Within every original exposure group, a record at or after a
//! boundary starts a new sub-group.

use chrono::{Duration, NaiveDateTime};

use super::{group_timestamps, log_division, log_group_table, partition_by_group, Record, RegroupError};
use crate::core::timestamps::{self, TimestampError};

/// Parse boundary labels into sorted instants, terminated by a sentinel.
///
/// The sentinel (`NaiveDateTime::MAX`) gives the final segment of every
/// group a ceiling that no record can reach.
pub fn parse_boundaries<S: AsRef<str>>(labels: &[S]) -> Result<Vec<NaiveDateTime>, TimestampError> {
    let mut boundaries = labels
        .iter()
        .map(|label| timestamps::parse_label(label.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    boundaries.sort();
    boundaries.push(NaiveDateTime::MAX);
    Ok(boundaries)
}

/// Split one group's (sorted) timestamps at `boundaries`.
///
/// `next_id` is the first id this group may use. Returns the id of every
/// record and the first id the following group may use.
///
/// Only one boundary is consumed per split: a record that lands past
/// several boundaries at once is followed by another split as soon as the
/// next record is also past the new current boundary.
pub fn split_by_boundaries(
    timestamps: &[NaiveDateTime],
    boundaries: &[NaiveDateTime],
    next_id: i64,
) -> (Vec<i64>, i64) {
    let Some(first) = timestamps.first() else {
        return (Vec::new(), next_id);
    };

    let last = boundaries.len().saturating_sub(1);
    let mut idx = boundaries
        .iter()
        .position(|b| first < b)
        .unwrap_or(last);

    let mut current = next_id;
    let mut ids = Vec::with_capacity(timestamps.len());

    for t in timestamps {
        let ceiling = boundaries.get(idx).copied().unwrap_or(NaiveDateTime::MAX);
        if *t >= ceiling {
            current += 1;
            if idx < last {
                idx += 1;
            }
        }
        ids.push(current);
    }

    // The next group starts right after our last id
    (ids, current + 1)
}

/// Assign new group ids by cutting every original group at `boundaries`.
///
/// `boundaries` should come from [`parse_boundaries`]. Returns one id per
/// record in input order; `records` is left untouched.
pub fn regroup_by_boundaries(
    records: &[Record],
    boundaries: &[NaiveDateTime],
    check_order: bool,
) -> Result<Vec<i64>, RegroupError> {
    let mut new_ids = vec![0i64; records.len()];
    let mut next_id = 0i64;

    for (original_id, indices) in partition_by_group(records) {
        let stamps = group_timestamps(records, &indices, check_order)?;
        let (ids, next) = split_by_boundaries(&stamps, boundaries, next_id);

        if ids.len() != indices.len() {
            return Err(RegroupError::Invariant(format!(
                "exposure group {} has {} records but {} assignments",
                original_id,
                indices.len(),
                ids.len()
            )));
        }

        for (&i, &id) in indices.iter().zip(&ids) {
            new_ids[i] = id;
        }
        log_division(original_id, &ids);
        next_id = next;
    }

    log_group_table(&new_ids);
    Ok(new_ids)
}

/// Derive boundaries that reproduce an existing partition.
///
/// For every pair of neighbouring records in the same original group that
/// ended up in different new groups, emits the instant half way between
/// them (rounded up, so it always lies after the earlier record). Pairs with
/// identical timestamps cannot be separated and are skipped.
pub fn midpoint_boundaries(records: &[Record], new_ids: &[i64]) -> Vec<NaiveDateTime> {
    debug_assert_eq!(records.len(), new_ids.len());

    let mut boundaries = Vec::new();
    for indices in partition_by_group(records).values() {
        for pair in indices.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if new_ids[a] == new_ids[b] {
                continue;
            }
            let prev = records[a].timestamp;
            let gap = (records[b].timestamp - prev).num_seconds();
            if gap <= 0 {
                continue;
            }
            boundaries.push(prev + Duration::seconds((gap + 1) / 2));
        }
    }

    boundaries.sort();
    boundaries.dedup();
    boundaries
}
