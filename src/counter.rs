//! Pattern occurrence counting with relative-position buckets.

use serde::{Deserialize, Serialize};

use crate::timeline::{PitchClass, Timeline};

/// Maps an occurrence's start index to a position bucket.
///
/// `n` is the number of pitched events in the unit being scanned; the
/// returned bucket must be `< bucket_count()` for every `index < n`.
pub trait Bucketing {
    fn bucket_count(&self) -> usize;
    fn labels(&self) -> &'static [&'static str];
    fn classify(&self, index: usize, n: usize) -> usize;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PositionScheme {
    /// Start 25% / middle 50% / end 25%
    #[default]
    Quartile,
    /// Ten 10% buckets
    Decile,
}

const QUARTILE_LABELS: [&str; 3] = ["Start 25%", "Middle 50%", "End 25%"];

const DECILE_LABELS: [&str; 10] = [
    "10th Percentile",
    "20th Percentile",
    "30th Percentile",
    "40th Percentile",
    "50th Percentile",
    "60th Percentile",
    "70th Percentile",
    "80th Percentile",
    "90th Percentile",
    "100th Percentile",
];

// Edges are floored f64 products rather than integer division, so
// 90 * 0.7 floors to 62 (not 63). Published counts depend on this.
const DECILE_FRACTIONS: [f64; 8] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];

fn floor_fraction(n: usize, fraction: f64) -> usize {
    (n as f64 * fraction) as usize
}

impl Bucketing for PositionScheme {
    fn bucket_count(&self) -> usize {
        self.labels().len()
    }

    fn labels(&self) -> &'static [&'static str] {
        match self {
            PositionScheme::Quartile => &QUARTILE_LABELS,
            PositionScheme::Decile => &DECILE_LABELS,
        }
    }

    fn classify(&self, index: usize, n: usize) -> usize {
        match self {
            PositionScheme::Quartile => {
                // Start and end widths are each floor(N/4), taken from
                // opposite ends; for N < 4 everything lands in the middle.
                let quarter = n / 4;
                if index < quarter {
                    0
                } else if index >= n - quarter {
                    2
                } else {
                    1
                }
            }
            PositionScheme::Decile => {
                if index >= n - floor_fraction(n, 0.1) {
                    return 9;
                }
                // The 90th-percentile bucket stretches up to the last
                // bucket's start, so rounding gaps are never dropped.
                DECILE_FRACTIONS
                    .iter()
                    .position(|&f| index < floor_fraction(n, f))
                    .unwrap_or(8)
            }
        }
    }
}

/// Occurrences of one pattern in one unit, per position bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCounts {
    pub buckets: Vec<u64>,
}

impl PositionCounts {
    pub fn zeros(bucket_count: usize) -> Self {
        Self {
            buckets: vec![0; bucket_count],
        }
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

/// Start indices of every exact contiguous match of `pattern` in `names`.
/// Overlapping matches all count. An empty pattern matches nowhere.
pub fn occurrences(names: &[PitchClass], pattern: &[PitchClass]) -> Vec<usize> {
    if pattern.is_empty() || pattern.len() > names.len() {
        return Vec::new();
    }
    names
        .windows(pattern.len())
        .enumerate()
        .filter(|(_, window)| *window == pattern)
        .map(|(i, _)| i)
        .collect()
}

/// Count `pattern` in an already extracted pitch-name sequence.
///
/// Callers scanning several patterns over one unit should extract the
/// names once so every pattern sees the identical index space.
pub fn count_in_names<B: Bucketing + ?Sized>(
    names: &[PitchClass],
    pattern: &[PitchClass],
    scheme: &B,
) -> PositionCounts {
    let mut counts = PositionCounts::zeros(scheme.bucket_count());
    let n = names.len();
    for i in occurrences(names, pattern) {
        counts.buckets[scheme.classify(i, n)] += 1;
    }
    counts
}

/// Count `pattern` in the pitched events of `timeline`.
pub fn count<B: Bucketing + ?Sized>(
    timeline: &Timeline,
    pattern: &[PitchClass],
    scheme: &B,
) -> PositionCounts {
    count_in_names(&timeline.pitch_names(), pattern, scheme)
}
