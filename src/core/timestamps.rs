//! Acquisition timestamp extraction from movie/micrograph file names.
//!
//! Spring8 acquisition software embeds the start time of every exposure in
//! the file name as `YYYY-MM-DD_HH_MM_SS`. This module pulls that instant out
//! of a path (or a free-form boundary label) and checks that a sequence of
//! them is in acquisition order.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use thiserror::Error;

/// `strftime` layout of the embedded timestamp.
pub const LABEL_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// Layout used when timestamps are shown to humans (reports, logs).
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised while extracting or ordering timestamps.
#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("no YYYY-MM-DD_HH_MM_SS timestamp found in '{input}'")]
    NoMatch { input: String },

    #[error("'{input}' contains a timestamp that is not a valid date-time")]
    InvalidDateTime { input: String },

    #[error("timestamps are not sorted at {index} - {next_index} ({current} > {next})")]
    Unsorted {
        index: usize,
        next_index: usize,
        current: NaiveDateTime,
        next: NaiveDateTime,
    },
}

/// Result type for timestamp operations.
pub type Result<T> = std::result::Result<T, TimestampError>;

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Greedy prefix: the last timestamp in the name wins.
    PATTERN.get_or_init(|| {
        Regex::new(r"^.*([0-9]{4})-([0-9]{2})-([0-9]{2})_([0-9]{2})_([0-9]{2})_([0-9]{2})")
            .expect("timestamp pattern is valid")
    })
}

/// Parse the embedded date-time out of an arbitrary string.
///
/// Used directly for boundary labels, which may carry a prefix or suffix
/// around the timestamp (e.g. `session2_2024-01-01_12_00_00`).
pub fn parse_label(label: &str) -> Result<NaiveDateTime> {
    let captures = timestamp_pattern()
        .captures(label)
        .ok_or_else(|| TimestampError::NoMatch {
            input: label.to_string(),
        })?;

    let field = |i: usize| -> u32 {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    let year = field(1) as i32;
    NaiveDate::from_ymd_opt(year, field(2), field(3))
        .and_then(|date| date.and_hms_opt(field(4), field(5), field(6)))
        .ok_or_else(|| TimestampError::InvalidDateTime {
            input: label.to_string(),
        })
}

/// Render an instant as a boundary label that [`parse_label`] accepts.
pub fn format_label(timestamp: &NaiveDateTime) -> String {
    timestamp.format(LABEL_FORMAT).to_string()
}

/// Return the final `/`-separated component of a blob path.
fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extract the acquisition timestamp from a movie/micrograph path.
///
/// Only the basename is searched, so dated directory names never leak into
/// the result.
///
/// # Errors
///
/// Returns an error naming the full path if the basename carries no
/// recognizable timestamp.
pub fn extract_timestamp(path: &str) -> Result<NaiveDateTime> {
    parse_label(basename(path)).map_err(|err| match err {
        TimestampError::NoMatch { .. } => TimestampError::NoMatch {
            input: path.to_string(),
        },
        TimestampError::InvalidDateTime { .. } => TimestampError::InvalidDateTime {
            input: path.to_string(),
        },
        other => other,
    })
}

/// Extract timestamps for every path, optionally verifying acquisition order.
///
/// There is no best-effort mode: the first path without a timestamp aborts
/// the whole extraction.
pub fn extract_timestamps<S: AsRef<str>>(paths: &[S], check_order: bool) -> Result<Vec<NaiveDateTime>> {
    let timestamps = paths
        .iter()
        .map(|p| extract_timestamp(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    if check_order {
        check_sorted(&timestamps)?;
    }

    Ok(timestamps)
}

/// Verify that `timestamps` is non-decreasing.
///
/// Reports the first adjacent pair that is out of order.
pub fn check_sorted(timestamps: &[NaiveDateTime]) -> Result<()> {
    for (i, pair) in timestamps.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(TimestampError::Unsorted {
                index: i,
                next_index: i + 1,
                current: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}
