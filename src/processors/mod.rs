//! Exposure-group regrouping passes.
//!
//! Each pass takes records that already belong to an original exposure group
//! and hands back a fresh vector of new group ids, aligned 1:1 with the input.
//! Original groups are visited in ascending id order and the next free id is
//! threaded through explicitly, so ids are never reused across groups.

pub mod boundary;
pub mod duration;
pub mod gap_scan;
pub mod summary;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::{debug, info};
use thiserror::Error;

use crate::core::timestamps::{self, TimestampError};

// Re-export key types for convenience
pub use boundary::{midpoint_boundaries, parse_boundaries, regroup_by_boundaries, split_by_boundaries};
pub use duration::{regroup_by_duration, split_by_duration};
pub use gap_scan::{gaps_seconds, scan_thresholds, threshold_steps, ThresholdScan};
pub use summary::{histogram, sturges_bins, summarize_group_changes, GroupSummary, Histogram};

/// Errors that can occur while regrouping.
#[derive(Debug, Error)]
pub enum RegroupError {
    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("{groups} group ids given for {paths} paths")]
    LengthMismatch { groups: usize, paths: usize },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// One particle: the exposure group it belongs to and its acquisition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub group_id: i64,
    pub timestamp: NaiveDateTime,
}

impl Record {
    pub fn new(group_id: i64, timestamp: NaiveDateTime) -> Self {
        Self { group_id, timestamp }
    }

    /// Build records from aligned group id and blob path columns.
    ///
    /// Fails on the first path without an embedded timestamp. With
    /// `check_order`, every original group must also be sorted by timestamp;
    /// groups may interleave with each other.
    pub fn from_paths<S: AsRef<str>>(
        group_ids: &[i64],
        paths: &[S],
        check_order: bool,
    ) -> Result<Vec<Record>, RegroupError> {
        if group_ids.len() != paths.len() {
            return Err(RegroupError::LengthMismatch {
                groups: group_ids.len(),
                paths: paths.len(),
            });
        }

        let stamps = timestamps::extract_timestamps(paths, false)?;
        let records: Vec<Record> = group_ids
            .iter()
            .zip(stamps)
            .map(|(&group_id, timestamp)| Record::new(group_id, timestamp))
            .collect();

        if check_order {
            for indices in partition_by_group(&records).values() {
                group_timestamps(&records, indices, true)?;
            }
        }

        Ok(records)
    }
}

/// Which passes to run and with what parameters.
#[derive(Debug, Clone, Default)]
pub struct RegroupPlan {
    /// Boundary labels for the explicit-boundary pass. `Some(vec![])` still
    /// runs the pass (which then only renumbers groups).
    pub boundaries: Option<Vec<String>>,
    /// Maximum accumulated gap per sub-group, in hours.
    pub hours: Option<f64>,
    /// Minimum number of particles a duration sub-group may end up with.
    pub min_per_group: usize,
    /// Verify each original group is sorted by timestamp before splitting.
    pub check_order: bool,
}

impl RegroupPlan {
    /// Reject plans that would do nothing or carry nonsensical parameters.
    pub fn validate(&self) -> Result<(), RegroupError> {
        if self.boundaries.is_none() && self.hours.is_none() {
            return Err(RegroupError::Usage(
                "no grouping option is specified; give grouping times and/or grouping hours".into(),
            ));
        }
        if let Some(hours) = self.hours {
            if !hours.is_finite() || hours <= 0.0 {
                return Err(RegroupError::Usage(format!(
                    "grouping hours must be a positive number, got {hours}"
                )));
            }
        }
        Ok(())
    }
}

/// Output of [`regroup`].
#[derive(Debug, Clone)]
pub struct Regrouping {
    /// New group id per input record, in input order.
    pub new_ids: Vec<i64>,
    pub summary: GroupSummary,
}

/// Run the passes selected by `plan` over `records`.
///
/// The boundary pass runs first; the duration pass then treats its output
/// ids as the groups to split further.
pub fn regroup(records: &[Record], plan: &RegroupPlan) -> Result<Regrouping, RegroupError> {
    plan.validate()?;

    let original: Vec<i64> = records.iter().map(|r| r.group_id).collect();
    let mut current = original.clone();

    if let Some(labels) = &plan.boundaries {
        info!("Grouping by grouping times...");
        let boundaries = parse_boundaries(labels)?;
        current = regroup_by_boundaries(records, &boundaries, plan.check_order)?;
    }

    if let Some(hours) = plan.hours {
        info!("Grouping by grouping hours...");
        let staged: Vec<Record> = records
            .iter()
            .zip(&current)
            .map(|(r, &id)| Record::new(id, r.timestamp))
            .collect();
        current = regroup_by_duration(&staged, hours, plan.min_per_group, plan.check_order)?;
    }

    let summary = summarize_group_changes(&original, &current);
    Ok(Regrouping {
        new_ids: current,
        summary,
    })
}

/// Record indices per original group, keyed in ascending group id order.
pub(crate) fn partition_by_group(records: &[Record]) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        groups.entry(record.group_id).or_default().push(i);
    }
    groups
}

/// Timestamps of the records at `indices`, optionally order-checked.
///
/// An ordering error reports positions in `records`, not in the group.
pub(crate) fn group_timestamps(
    records: &[Record],
    indices: &[usize],
    check_order: bool,
) -> Result<Vec<NaiveDateTime>, RegroupError> {
    let stamps: Vec<NaiveDateTime> = indices.iter().map(|&i| records[i].timestamp).collect();
    if check_order {
        timestamps::check_sorted(&stamps).map_err(|e| match e {
            TimestampError::Unsorted {
                index,
                next_index,
                current,
                next,
            } => TimestampError::Unsorted {
                index: indices[index],
                next_index: indices[next_index],
                current,
                next,
            },
            other => other,
        })?;
    }
    Ok(stamps)
}

/// Log how one original group was divided.
pub(crate) fn log_division(original_id: i64, ids: &[i64]) {
    let mut uniq = ids.to_vec();
    uniq.dedup();
    info!(
        "Exposure group {} was divided into {} groups: {:?}",
        original_id,
        uniq.len(),
        uniq
    );
}

/// Dump the particle count per resulting group at debug level.
pub(crate) fn log_group_table(ids: &[i64]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &id in ids {
        *counts.entry(id).or_default() += 1;
    }
    debug!("Exposure group id : Number of particles");
    for (id, n) in &counts {
        debug!("{:5} : {:8}", id, n);
    }
    // Ties resolve to the lowest id
    if let Some((id, n)) = counts.iter().min_by_key(|&(id, n)| (*n, *id)) {
        debug!("Minimum exposure group is {}, which is composed of {} particles", id, n);
    }
}
