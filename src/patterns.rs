use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::timeline::{PitchClass, PitchError};

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid pattern file {path}: {message}")]
    Format { path: PathBuf, message: String },
    #[error("Unsupported pattern file extension {0:?} (use json, yaml, yml or toml)")]
    UnsupportedExtension(String),
    #[error("Pattern source {source_name:?}, pattern {index}: {error}")]
    InvalidPitch {
        source_name: String,
        index: usize,
        error: PitchError,
    },
    #[error("Pattern source {0:?} is declared twice")]
    DuplicateSource(String),
}

/// A cento: an ordered run of pitch classes. Its key is the concatenated names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    notes: Vec<PitchClass>,
    key: String,
}

impl Pattern {
    pub fn new(notes: Vec<PitchClass>) -> Self {
        let key = notes.iter().map(PitchClass::as_str).collect();
        Self { notes, key }
    }

    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, PitchError> {
        let notes = tokens
            .iter()
            .map(|t| PitchClass::parse(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(notes))
    }

    pub fn notes(&self) -> &[PitchClass] {
        &self.notes
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// A named list of patterns, e.g. the centos produced by one discovery method.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSource {
    pub name: String,
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Deserialize)]
struct SourceFile {
    sources: Vec<RawSource>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: String,
    patterns: Vec<RawPattern>,
}

/// Either `["C", "D", "E"]` or `"C D E"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPattern {
    Tokens(Vec<String>),
    Spaced(String),
}

impl RawPattern {
    fn tokens(&self) -> Vec<&str> {
        match self {
            RawPattern::Tokens(t) => t.iter().map(String::as_str).collect(),
            RawPattern::Spaced(s) => s.split_whitespace().collect(),
        }
    }
}

/// Load pattern sources from a JSON, YAML or TOML file (by extension).
/// Every file has a top-level `sources` list.
pub fn load_sources(path: &Path) -> Result<Vec<PatternSource>, PatternError> {
    let text = std::fs::read_to_string(path).map_err(|source| PatternError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let format_err = |message: String| PatternError::Format {
        path: path.to_path_buf(),
        message,
    };
    let file: SourceFile = match ext.as_str() {
        "json" => serde_json::from_str(&text).map_err(|e| format_err(e.to_string()))?,
        "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| format_err(e.to_string()))?,
        "toml" => toml::from_str(&text).map_err(|e| format_err(e.to_string()))?,
        other => return Err(PatternError::UnsupportedExtension(other.to_string())),
    };

    build_sources(file.sources)
}

fn build_sources(raw: Vec<RawSource>) -> Result<Vec<PatternSource>, PatternError> {
    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(raw.len());

    for source in raw {
        let name = source.name.trim().to_string();
        if !seen.insert(name.clone()) {
            return Err(PatternError::DuplicateSource(name));
        }

        let patterns = source
            .patterns
            .iter()
            .enumerate()
            .map(|(index, p)| {
                Pattern::parse(&p.tokens()).map_err(|error| PatternError::InvalidPitch {
                    source_name: name.clone(),
                    index,
                    error,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("Pattern source {:?}: {} patterns", name, patterns.len());
        sources.push(PatternSource { name, patterns });
    }

    Ok(sources)
}
