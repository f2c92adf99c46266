//! JSON report of one `count` run: the input to downstream significance
//! testing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aggregate::{Analysis, LevelAnalysis};
use crate::corpus::LoadReport;
use crate::counter::{Bucketing, PositionScheme};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
pub struct SkippedPiece {
    pub piece_id: String,
    pub path: PathBuf,
    pub cause: String,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub generated_at: DateTime<Utc>,
    pub scheme: PositionScheme,
    pub bucket_labels: &'static [&'static str],
    pub sources: Vec<String>,
    pub pieces_discovered: usize,
    pub pieces_loaded: usize,
    pub skipped: Vec<SkippedPiece>,
    pub sanai: &'a LevelAnalysis,
    pub lines: &'a LevelAnalysis,
}

impl<'a> Report<'a> {
    pub fn new(analysis: &'a Analysis, load: &LoadReport, sources: Vec<String>) -> Self {
        let skipped = load
            .failures
            .iter()
            .map(|f| SkippedPiece {
                piece_id: f.piece_id.clone(),
                path: f.path.clone(),
                cause: f.cause.to_string(),
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            scheme: analysis.scheme,
            bucket_labels: analysis.scheme.labels(),
            sources,
            pieces_discovered: load.discovered,
            pieces_loaded: load.loaded,
            skipped,
            sanai: &analysis.sanai,
            lines: &analysis.lines,
        }
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Wrote report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{PositionTable, normalize_and_total};
    use crate::corpus::{FailureCause, PieceFailure};
    use std::collections::BTreeMap;

    fn level(scheme: PositionScheme) -> LevelAnalysis {
        let mut table = PositionTable::new(scheme);
        table.add_row("CD", &[1, 2, 1]).unwrap();
        let mut groups = BTreeMap::new();
        groups.insert("TF IDF centos".to_string(), table.clone());
        let mut titled = BTreeMap::new();
        titled.insert("TF IDF centos : sanai of X".to_string(), table);
        let mut tables = BTreeMap::new();
        tables.insert("TF IDF centos".to_string(), titled);
        let distribution = normalize_and_total(scheme, &groups).unwrap();
        LevelAnalysis {
            tables,
            groups,
            distribution,
        }
    }

    #[test]
    fn test_report_json_shape() {
        let scheme = PositionScheme::Quartile;
        let analysis = Analysis {
            scheme,
            sanai: level(scheme),
            lines: level(scheme),
        };
        let load = LoadReport {
            discovered: 2,
            loaded: 1,
            failures: vec![PieceFailure {
                piece_id: "orphan".to_string(),
                path: PathBuf::from("scores/orphan.xml"),
                cause: FailureCause::NoAnnotation,
            }],
        };
        let report = Report::new(&analysis, &load, vec!["TF IDF centos".to_string()]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["scheme"], "quartile");
        assert_eq!(value["bucket_labels"][1], "Middle 50%");
        assert_eq!(value["skipped"][0]["piece_id"], "orphan");
        assert_eq!(value["sanai"]["groups"]["TF IDF centos"]["rows"]["CD"][1], 2);
        assert_eq!(value["lines"]["distribution"]["rows_used"], 1);
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn test_write_to_missing_dir_fails() {
        let scheme = PositionScheme::Decile;
        let analysis = Analysis {
            scheme,
            sanai: LevelAnalysis {
                tables: BTreeMap::new(),
                groups: BTreeMap::new(),
                distribution: normalize_and_total(scheme, &BTreeMap::new()).unwrap(),
            },
            lines: LevelAnalysis {
                tables: BTreeMap::new(),
                groups: BTreeMap::new(),
                distribution: normalize_and_total(scheme, &BTreeMap::new()).unwrap(),
            },
        };
        let load = LoadReport {
            discovered: 0,
            loaded: 0,
            failures: Vec::new(),
        };
        let report = Report::new(&analysis, &load, Vec::new());
        let err = report.write(Path::new("/no/such/dir/report.json")).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }
}
