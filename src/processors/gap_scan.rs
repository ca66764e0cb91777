//! Gap threshold scan for choosing grouping times.
//!
//! Acquisition sessions that were interrupted show up as unusually long gaps
//! between consecutive movies. Scanning a range of gap thresholds shows how
//! many interruptions each threshold would detect and proposes a boundary
//! label just before every one of them.

use chrono::{Duration, NaiveDateTime};

use super::RegroupError;
use crate::core::timestamps::{check_sorted, format_label};

/// Result of one threshold in a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdScan {
    pub threshold_secs: i64,
    /// Gaps at or above the threshold, in acquisition order.
    pub gaps_at_or_above: Vec<f64>,
    /// One second before every record whose gap strictly exceeds the threshold.
    pub boundaries: Vec<NaiveDateTime>,
}

impl ThresholdScan {
    /// Boundaries rendered as grouping-time labels.
    pub fn boundary_labels(&self) -> Vec<String> {
        self.boundaries.iter().map(format_label).collect()
    }
}

/// Seconds since the previous timestamp; the first entry is 0.
pub fn gaps_seconds(timestamps: &[NaiveDateTime]) -> Vec<f64> {
    if timestamps.is_empty() {
        return Vec::new();
    }
    let mut gaps = Vec::with_capacity(timestamps.len());
    gaps.push(0.0);
    gaps.extend(
        timestamps
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_seconds() as f64),
    );
    gaps
}

/// Thresholds `min, min + step, ...` up to and including `max`.
pub fn threshold_steps(min: i64, max: i64, step: i64) -> Result<Vec<i64>, RegroupError> {
    if step <= 0 {
        return Err(RegroupError::Usage(format!("threshold step must be positive, got {step}")));
    }
    if min > max {
        return Err(RegroupError::Usage(format!(
            "threshold min {min} is larger than max {max}"
        )));
    }
    Ok((min..=max).step_by(step as usize).collect())
}

/// Scan gap thresholds over a full, acquisition-ordered timestamp sequence.
///
/// # Errors
///
/// Fails if `timestamps` is not sorted or the threshold range is invalid.
pub fn scan_thresholds(
    timestamps: &[NaiveDateTime],
    min: i64,
    max: i64,
    step: i64,
) -> Result<Vec<ThresholdScan>, RegroupError> {
    check_sorted(timestamps)?;
    let steps = threshold_steps(min, max, step)?;
    let gaps = gaps_seconds(timestamps);

    Ok(steps
        .into_iter()
        .map(|threshold_secs| {
            let limit = threshold_secs as f64;
            let gaps_at_or_above = gaps.iter().copied().filter(|&g| g >= limit).collect();
            let boundaries = timestamps
                .iter()
                .zip(&gaps)
                .filter(|&(_, &g)| g > limit)
                .map(|(t, _)| *t - Duration::seconds(1))
                .collect();
            ThresholdScan {
                threshold_secs,
                gaps_at_or_above,
                boundaries,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timestamps::DISPLAY_FORMAT;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DISPLAY_FORMAT).unwrap()
    }

    fn session() -> Vec<NaiveDateTime> {
        [
            "2024-01-01 10:00:00",
            "2024-01-01 10:01:00",
            "2024-01-01 10:02:00",
            "2024-01-01 10:12:00",
            "2024-01-01 10:13:00",
            "2024-01-01 11:13:00",
        ]
        .iter()
        .map(|s| ts(s))
        .collect()
    }

    #[test]
    fn test_gaps_seconds() {
        assert_eq!(gaps_seconds(&session()), vec![0.0, 60.0, 60.0, 600.0, 60.0, 3600.0]);
        assert!(gaps_seconds(&[]).is_empty());
    }

    #[test]
    fn test_threshold_steps_includes_max() {
        assert_eq!(threshold_steps(300, 900, 300).unwrap(), vec![300, 600, 900]);
        assert_eq!(threshold_steps(300, 1000, 300).unwrap(), vec![300, 600, 900]);
        assert!(threshold_steps(0, 10, 0).is_err());
        assert!(threshold_steps(10, 0, 1).is_err());
    }

    #[test]
    fn test_scan_thresholds() {
        let scans = scan_thresholds(&session(), 600, 1200, 600).unwrap();
        assert_eq!(scans.len(), 2);

        // 600 s: the 600 s gap is counted but only the hour gap is a boundary
        let first = &scans[0];
        assert_eq!(first.threshold_secs, 600);
        assert_eq!(first.gaps_at_or_above, vec![600.0, 3600.0]);
        assert_eq!(first.boundary_labels(), vec!["2024-01-01_11_12_59".to_string()]);

        let second = &scans[1];
        assert_eq!(second.gaps_at_or_above, vec![3600.0]);
        assert_eq!(second.boundaries, vec![ts("2024-01-01 11:12:59")]);
    }

    #[test]
    fn test_scan_boundaries_split_sessions() {
        use crate::processors::{parse_boundaries, regroup_by_boundaries, Record};

        let stamps = session();
        let scans = scan_thresholds(&stamps, 300, 300, 60).unwrap();
        let boundaries = parse_boundaries(&scans[0].boundary_labels()).unwrap();
        let records: Vec<Record> = stamps.iter().map(|&t| Record::new(0, t)).collect();

        let ids = regroup_by_boundaries(&records, &boundaries, true).unwrap();
        assert_eq!(ids, vec![0, 0, 0, 1, 1, 2]);
    }

    #[test]
    fn test_scan_requires_sorted_input() {
        let mut stamps = session();
        stamps.swap(0, 1);
        assert!(matches!(
            scan_thresholds(&stamps, 60, 60, 1),
            Err(RegroupError::Timestamp(_))
        ));
    }
}
