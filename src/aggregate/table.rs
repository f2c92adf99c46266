use serde::Serialize;
use std::collections::BTreeMap;

use super::{AggregateError, PatternCounts};
use crate::counter::{Bucketing, PositionScheme};

/// Per-pattern bucket totals, one column per position bucket of `scheme`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionTable {
    scheme: PositionScheme,
    rows: BTreeMap<String, Vec<u64>>,
}

impl PositionTable {
    pub fn new(scheme: PositionScheme) -> Self {
        Self {
            scheme,
            rows: BTreeMap::new(),
        }
    }

    /// Flatten label → pattern → counts into one row per pattern, summing
    /// over labels. Patterns that never occur keep an all-zero row.
    pub fn from_node_counts(
        scheme: PositionScheme,
        node_counts: &BTreeMap<String, PatternCounts>,
    ) -> Result<Self, AggregateError> {
        let mut table = Self::new(scheme);
        for patterns in node_counts.values() {
            for (pattern, counts) in patterns {
                table.add_row(pattern, &counts.buckets)?;
            }
        }
        Ok(table)
    }

    pub fn scheme(&self) -> PositionScheme {
        self.scheme
    }

    /// Add `buckets` to the row for `pattern`, creating it if needed.
    pub fn add_row(&mut self, pattern: &str, buckets: &[u64]) -> Result<(), AggregateError> {
        let expected = self.scheme.bucket_count();
        if buckets.len() != expected {
            return Err(AggregateError::ColumnMismatch {
                pattern: pattern.to_string(),
                scheme: self.scheme,
                expected,
                got: buckets.len(),
            });
        }
        let row = self
            .rows
            .entry(pattern.to_string())
            .or_insert_with(|| vec![0; expected]);
        for (total, n) in row.iter_mut().zip(buckets) {
            *total += n;
        }
        Ok(())
    }

    /// Sum another table into this one, row by pattern.
    pub fn merge(&mut self, other: &PositionTable) -> Result<(), AggregateError> {
        if other.scheme != self.scheme {
            return Err(AggregateError::SchemeMismatch {
                left: self.scheme,
                right: other.scheme,
            });
        }
        for (pattern, buckets) in &other.rows {
            self.add_row(pattern, buckets)?;
        }
        Ok(())
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &[u64])> {
        self.rows.iter().map(|(p, b)| (p.as_str(), b.as_slice()))
    }

    pub fn row(&self, pattern: &str) -> Option<&[u64]> {
        self.rows.get(pattern).map(Vec::as_slice)
    }

    /// Occurrences of `pattern` across all buckets.
    pub fn row_total(&self, pattern: &str) -> u64 {
        self.row(pattern).map(|b| b.iter().sum()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column sums.
    pub fn bucket_totals(&self) -> Vec<u64> {
        let mut totals = vec![0; self.scheme.bucket_count()];
        for buckets in self.rows.values() {
            for (t, n) in totals.iter_mut().zip(buckets) {
                *t += n;
            }
        }
        totals
    }
}

/// Sum every titled table of each pattern source into one table per source.
/// Sources with no tables still get an (empty) entry.
pub fn merge_by_group(
    scheme: PositionScheme,
    by_source: &BTreeMap<String, BTreeMap<String, PositionTable>>,
) -> Result<BTreeMap<String, PositionTable>, AggregateError> {
    let mut merged = BTreeMap::new();
    for (source, titled) in by_source {
        let mut group = PositionTable::new(scheme);
        for table in titled.values() {
            group.merge(table)?;
        }
        merged.insert(source.clone(), group);
    }
    Ok(merged)
}

/// Row scaled to sum to 1, or `None` for an all-zero row.
pub fn normalize_row(buckets: &[u64]) -> Option<Vec<f64>> {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return None;
    }
    Some(buckets.iter().map(|&n| n as f64 / total as f64).collect())
}

/// Corpus-wide shape of where patterns occur: the per-bucket sum of
/// row-normalized counts over every row of every table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub scheme: PositionScheme,
    pub totals: Vec<f64>,
    pub rows_used: usize,
    /// All-zero rows, left out rather than contributing NaN.
    pub rows_skipped: usize,
}

impl Distribution {
    pub fn labeled(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.scheme.labels().iter().copied().zip(self.totals.iter().copied())
    }

    /// Totals rescaled to sum to 1 (all zeros if nothing was counted).
    pub fn shares(&self) -> Vec<f64> {
        let sum: f64 = self.totals.iter().sum();
        if sum == 0.0 {
            return vec![0.0; self.totals.len()];
        }
        self.totals.iter().map(|t| t / sum).collect()
    }
}

pub fn normalize_and_total(
    scheme: PositionScheme,
    tables: &BTreeMap<String, PositionTable>,
) -> Result<Distribution, AggregateError> {
    let mut dist = Distribution {
        scheme,
        totals: vec![0.0; scheme.bucket_count()],
        rows_used: 0,
        rows_skipped: 0,
    };

    for table in tables.values() {
        if table.scheme() != scheme {
            return Err(AggregateError::SchemeMismatch {
                left: scheme,
                right: table.scheme(),
            });
        }
        for (pattern, buckets) in table.rows() {
            match normalize_row(buckets) {
                Some(shares) => {
                    for (t, s) in dist.totals.iter_mut().zip(shares) {
                        *t += s;
                    }
                    dist.rows_used += 1;
                }
                None => {
                    log::trace!("Skipping all-zero row {pattern}");
                    dist.rows_skipped += 1;
                }
            }
        }
    }

    Ok(dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::PositionCounts;

    fn table(rows: &[(&str, [u64; 3])]) -> PositionTable {
        let mut t = PositionTable::new(PositionScheme::Quartile);
        for (p, b) in rows {
            t.add_row(p, b).unwrap();
        }
        t
    }

    #[test]
    fn test_reshape_sums_over_labels() {
        let counts = |b: [u64; 3]| PositionCounts {
            buckets: b.to_vec(),
        };
        let mut node_counts: BTreeMap<String, PatternCounts> = BTreeMap::new();
        node_counts.insert(
            "section_1_sana_1".into(),
            [
                ("CD".to_string(), counts([1, 0, 2])),
                ("EF".to_string(), counts([0, 0, 0])),
            ]
            .into(),
        );
        node_counts.insert(
            "section_1_sana_2".into(),
            [("CD".to_string(), counts([3, 1, 0]))].into(),
        );

        let t = PositionTable::from_node_counts(PositionScheme::Quartile, &node_counts).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.row("CD"), Some(&[4, 1, 2][..]));
        assert_eq!(t.row("EF"), Some(&[0, 0, 0][..]));
        assert_eq!(t.bucket_totals(), vec![4, 1, 2]);
        assert_eq!(t.row_total("CD"), 7);
        assert_eq!(t.row_total("GA"), 0);
    }

    fn titled(entries: Vec<(&str, PositionTable)>) -> BTreeMap<String, PositionTable> {
        entries.into_iter().map(|(t, table)| (t.to_string(), table)).collect()
    }

    #[test]
    fn test_merge_by_group_scenario() {
        let mut by_source = BTreeMap::new();
        by_source.insert(
            "TF IDF centos".to_string(),
            titled(vec![
                (
                    "TF IDF centos : sanai of X",
                    table(&[("CD", [1, 2, 3]), ("EF", [0, 1, 0])]),
                ),
                (
                    "TF IDF centos : sanai of Y",
                    table(&[("CD", [1, 1, 1]), ("GA", [5, 0, 0])]),
                ),
            ]),
        );
        by_source.insert(
            "SIA centos".to_string(),
            titled(vec![("SIA centos : sanai of X", table(&[("CD", [9, 9, 9])]))]),
        );

        let merged = merge_by_group(PositionScheme::Quartile, &by_source).unwrap();
        assert_eq!(merged.len(), 2);

        let tf = &merged["TF IDF centos"];
        assert_eq!(tf.len(), 3);
        assert!(tf.len() <= 4);
        assert_eq!(tf.row("CD"), Some(&[2, 3, 4][..]));
        assert_eq!(tf.row("EF"), Some(&[0, 1, 0][..]));
        assert_eq!(tf.row("GA"), Some(&[5, 0, 0][..]));
        assert_eq!(merged["SIA centos"].row("CD"), Some(&[9, 9, 9][..]));
    }

    #[test]
    fn test_groups_follow_source_names_not_title_text() {
        let mut by_source = BTreeMap::new();
        for name in ["MGPD: run 1", "MGPD: run 2"] {
            let title = format!("{name} : sanai of X");
            by_source.insert(
                name.to_string(),
                titled(vec![(title.as_str(), table(&[("CD", [1, 2, 1])]))]),
            );
        }
        by_source.insert("empty".to_string(), BTreeMap::new());

        let merged = merge_by_group(PositionScheme::Quartile, &by_source).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["MGPD: run 1"].row("CD"), Some(&[1, 2, 1][..]));
        assert_eq!(merged["MGPD: run 2"].row("CD"), Some(&[1, 2, 1][..]));
        assert!(merged["empty"].is_empty());
    }

    #[test]
    fn test_normalized_rows_sum_to_one() {
        for row in [[1u64, 2, 3], [0, 0, 7], [5, 5, 0]] {
            let n = normalize_row(&row).unwrap();
            assert!((n.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        assert_eq!(normalize_row(&[0, 0, 0]), None);
    }

    #[test]
    fn test_zero_rows_are_skipped_not_nan() {
        let mut tables = BTreeMap::new();
        tables.insert("a".to_string(), table(&[("CD", [1, 1, 2]), ("EF", [0, 0, 0])]));
        tables.insert("b".to_string(), table(&[("CD", [0, 3, 0])]));

        let dist = normalize_and_total(PositionScheme::Quartile, &tables).unwrap();
        assert_eq!(dist.rows_used, 2);
        assert_eq!(dist.rows_skipped, 1);
        assert!(dist.totals.iter().all(|t| t.is_finite()));
        let expected = [0.25, 1.25, 0.5];
        for (got, want) in dist.totals.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
        assert!((dist.totals.iter().sum::<f64>() - dist.rows_used as f64).abs() < 1e-12);
        let shares = dist.shares();
        assert!((shares.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mixed_schemes_fail_loudly() {
        let mut quartile = table(&[("CD", [1, 0, 0])]);
        let mut decile = PositionTable::new(PositionScheme::Decile);
        decile.add_row("CD", &[1; 10]).unwrap();

        assert!(matches!(quartile.merge(&decile), Err(AggregateError::SchemeMismatch { .. })));
        assert!(matches!(
            quartile.add_row("CD", &[1; 10]),
            Err(AggregateError::ColumnMismatch { expected: 3, got: 10, .. })
        ));

        let mut tables = BTreeMap::new();
        tables.insert("x : sanai of A".to_string(), quartile);
        tables.insert("x : sanai of B".to_string(), decile);
        let mut by_source = BTreeMap::new();
        by_source.insert("x".to_string(), tables.clone());
        assert!(merge_by_group(PositionScheme::Quartile, &by_source).is_err());
        assert!(normalize_and_total(PositionScheme::Quartile, &tables).is_err());
    }

    #[test]
    fn test_empty_distribution() {
        let dist = normalize_and_total(PositionScheme::Decile, &BTreeMap::new()).unwrap();
        assert_eq!(dist.totals, vec![0.0; 10]);
        assert_eq!(dist.shares(), vec![0.0; 10]);
        assert_eq!(dist.labeled().count(), 10);
    }
}
