//! Reporting: how original exposure groups were divided, and histogram binning
//! for the report plots.

use std::collections::BTreeMap;
use std::fmt;

/// Per original group, the new groups it was split into with their sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSummary {
    splits: BTreeMap<i64, BTreeMap<i64, usize>>,
}

impl GroupSummary {
    /// Mapping original id -> {new id: particle count}.
    pub fn splits(&self) -> &BTreeMap<i64, BTreeMap<i64, usize>> {
        &self.splits
    }

    pub fn original_group_count(&self) -> usize {
        self.splits.len()
    }

    pub fn new_group_count(&self) -> usize {
        self.new_group_sizes().len()
    }

    /// Particle count of every new group, in ascending id order.
    pub fn group_sizes(&self) -> Vec<usize> {
        self.new_group_sizes().into_values().collect()
    }

    /// The new group with the fewest particles (lowest id on ties).
    pub fn smallest_group(&self) -> Option<(i64, usize)> {
        self.new_group_sizes()
            .into_iter()
            .min_by_key(|&(id, n)| (n, id))
    }

    fn new_group_sizes(&self) -> BTreeMap<i64, usize> {
        let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
        for news in self.splits.values() {
            for (&id, &n) in news {
                *sizes.entry(id).or_default() += n;
            }
        }
        sizes
    }
}

impl fmt::Display for GroupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Exposure groups were re-grouped from {} groups to {} groups.",
            self.original_group_count(),
            self.new_group_count()
        )?;
        for (orig, news) in &self.splits {
            let total: usize = news.values().sum();
            let ids: Vec<i64> = news.keys().copied().collect();
            let counts: Vec<usize> = news.values().copied().collect();
            writeln!(
                f,
                "Exposure group {} (#ptcls={}) was divided into {} groups: {:?} (#ptcls={:?})",
                orig,
                total,
                ids.len(),
                ids,
                counts
            )?;
        }
        Ok(())
    }
}

/// Summarize how each original group was divided.
///
/// `original` and `new` are the per-record group ids before and after
/// regrouping, aligned by position.
pub fn summarize_group_changes(original: &[i64], new: &[i64]) -> GroupSummary {
    debug_assert_eq!(original.len(), new.len());

    let mut splits: BTreeMap<i64, BTreeMap<i64, usize>> = BTreeMap::new();
    for (&orig, &id) in original.iter().zip(new) {
        *splits.entry(orig).or_default().entry(id).or_default() += 1;
    }
    GroupSummary { splits }
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Bin edges; `edges.len() == counts.len() + 1` unless empty.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Bin `values` into `bins` equal-width bins spanning their range.
///
/// The last bin is closed on the right. A constant input is centred in a
/// range of width one.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return Histogram {
            edges: Vec::new(),
            counts: Vec::new(),
        };
    }

    let bins = bins.max(1);
    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Histogram { edges, counts }
}

/// Sturges' rule for the number of histogram bins.
pub fn sturges_bins(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    (n as f64).log2().ceil() as usize + 1
}
