use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mode label meaning "no mizan"; never shown in titles.
pub const NO_MIZAN: &str = "none";

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid annotation JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One node of a piece's structure as written in the annotation file.
///
/// The same shape is used at every depth: sections carry `ṣanā`i``, a sana
/// carries `lines`, a line carries `sections`. Bounds are optional here so a
/// malformed node fails only its own piece during extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default, rename = "mīzān")]
    pub mizan: Option<String>,
    #[serde(default, rename = "ṣanā`i`")]
    pub sanai: Option<Vec<RawNode>>,
    #[serde(default)]
    pub lines: Option<Vec<RawNode>>,
    #[serde(default)]
    pub sections: Option<Vec<RawNode>>,
}

/// Annotation for one piece, keyed by its MusicBrainz id.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationRecord {
    pub mbid: String,
    #[serde(default)]
    pub sections: Vec<RawNode>,
}

impl AnnotationRecord {
    /// Distinct mode labels of the top-level sections, minus absent and `"none"`.
    pub fn mizans(&self) -> BTreeSet<String> {
        self.sections
            .iter()
            .filter_map(|s| s.mizan.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != NO_MIZAN)
            .map(str::to_string)
            .collect()
    }
}

/// Read the annotation set (a JSON array of records).
pub fn load_annotations(path: &Path) -> Result<Vec<AnnotationRecord>, AnnotationError> {
    let text = std::fs::read_to_string(path).map_err(|source| AnnotationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| AnnotationError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Index records by mbid. The first record for an mbid wins.
pub fn index_by_mbid(records: Vec<AnnotationRecord>) -> HashMap<String, AnnotationRecord> {
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        if index.contains_key(&record.mbid) {
            log::warn!("Duplicate annotation for {}, keeping the first", record.mbid);
            continue;
        }
        index.insert(record.mbid.clone(), record);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
      {
        "mbid": "piece-1",
        "sections": [
          {"start": 0, "end": 8, "mīzān": "basīṭ"},
          {"start": 8, "end": 24, "mīzān": "none",
           "ṣanā`i`": [
             {"start": 8, "end": 16, "lines": [
               {"start": 8, "end": 12, "sections": [
                 {"start": 8, "end": 10}, {"start": 10, "end": 12}
               ]},
               {"start": 12, "end": 16}
             ]}
           ]},
          {"start": 24, "end": 32, "mīzān": "qāyim wa-nuṣf"},
          {"start": 32, "end": 40, "mīzān": "basīṭ"}
        ],
        "title": "ignored"
      },
      {"mbid": "piece-2", "sections": [{"start": 0}]},
      {"mbid": "piece-1", "sections": []}
    ]"#;

    fn records() -> Vec<AnnotationRecord> {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_nested_keys_deserialize() {
        let recs = records();
        let sanai = recs[0].sections[1].sanai.as_ref().unwrap();
        let lines = sanai[0].lines.as_ref().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].sections.as_ref().unwrap().len(), 2);
        assert!(lines[1].sections.is_none());
        assert_eq!(recs[0].sections[0].start, Some(0.0));
    }

    #[test]
    fn test_missing_bounds_still_deserialize() {
        let recs = records();
        assert_eq!(recs[1].sections[0].end, None);
    }

    #[test]
    fn test_mizans_skip_none_and_dedupe() {
        let recs = records();
        let m: Vec<String> = recs[0].mizans().into_iter().collect();
        assert_eq!(m, vec!["basīṭ".to_string(), "qāyim wa-nuṣf".to_string()]);
        assert!(recs[1].mizans().is_empty());
    }

    #[test]
    fn test_index_keeps_first() {
        let index = index_by_mbid(records());
        assert_eq!(index.len(), 2);
        assert_eq!(index["piece-1"].sections.len(), 4);
    }

    #[test]
    fn test_load_annotations_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_annotations(&path).unwrap_err();
        assert!(matches!(err, AnnotationError::Json { .. }));
        assert!(err.to_string().contains("annotations.json"));
    }
}
