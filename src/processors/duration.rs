//! Gap-based (duration) regrouping.
//!
//! Within an original exposure group, time between consecutive exposures is
//! accumulated; once a sub-group has spanned more than the threshold it is
//! closed and the next record opens a new one. A floor on the sub-group size
//! keeps tiny groups from being created.

use chrono::NaiveDateTime;

use super::{group_timestamps, log_division, log_group_table, partition_by_group, Record, RegroupError};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Lengths of the runs of equal ids in `ids`.
fn run_lengths(ids: &[i64]) -> Vec<usize> {
    let mut runs: Vec<usize> = Vec::new();
    let mut prev: Option<i64> = None;
    for &id in ids {
        match (prev, runs.last_mut()) {
            (Some(p), Some(n)) if p == id => *n += 1,
            _ => runs.push(1),
        }
        prev = Some(id);
    }
    runs
}

/// Split one group's (sorted) timestamps by accumulated elapsed time.
///
/// A record whose accumulated gap exceeds `threshold_secs` opens a new
/// sub-group only when the current one already holds more than `floor`
/// records. A trailing sub-group that still ends up below `floor` is folded
/// into its predecessor; only that single step of lookback is performed.
///
/// Returns the id of every record and the first id the following group may
/// use.
pub fn split_by_duration(
    timestamps: &[NaiveDateTime],
    threshold_secs: f64,
    floor: usize,
    next_id: i64,
) -> Result<(Vec<i64>, i64), RegroupError> {
    if timestamps.is_empty() {
        return Ok((Vec::new(), next_id));
    }

    let mut current = next_id;
    let mut count = 1usize;
    let mut elapsed = 0.0f64;
    let mut ids = Vec::with_capacity(timestamps.len());
    ids.push(current);

    for pair in timestamps.windows(2) {
        elapsed += (pair[1] - pair[0]).num_seconds() as f64;
        if elapsed > threshold_secs && count > floor {
            current += 1;
            count = 1;
            elapsed = 0.0;
        } else {
            count += 1;
        }
        ids.push(current);
    }

    if current > next_id && count < floor {
        let merged_into = current - 1;
        for id in ids.iter_mut().filter(|id| **id == current) {
            *id = merged_into;
        }
        current = merged_into;
    }

    let sizes = run_lengths(&ids);
    if sizes.len() > 1 {
        if let Some(size) = sizes.iter().find(|&&n| n < floor) {
            return Err(RegroupError::Invariant(format!(
                "sub-group of {} records left below the floor of {}",
                size, floor
            )));
        }
    }

    Ok((ids, current + 1))
}

/// Assign new group ids by splitting every original group on elapsed time.
///
/// `hours` is the span a sub-group may reach before it is closed and
/// `min_per_group` the minimum sub-group size. Returns one id per record in
/// input order; `records` is left untouched.
///
/// # Errors
///
/// Returns `RegroupError::Usage` for a non-positive `hours`, a timestamp
/// error if `check_order` is set and a group is out of order, and
/// `RegroupError::Invariant` if the size floor could not be honoured.
pub fn regroup_by_duration(
    records: &[Record],
    hours: f64,
    min_per_group: usize,
    check_order: bool,
) -> Result<Vec<i64>, RegroupError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(RegroupError::Usage(format!(
            "grouping hours must be a positive number, got {hours}"
        )));
    }
    let threshold_secs = hours * SECONDS_PER_HOUR;

    let mut new_ids = vec![0i64; records.len()];
    let mut next_id = 0i64;

    for (original_id, indices) in partition_by_group(records) {
        let stamps = group_timestamps(records, &indices, check_order)?;
        let (ids, next) = split_by_duration(&stamps, threshold_secs, min_per_group, next_id)?;

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
