use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

use crate::annotations::{self, AnnotationError, AnnotationRecord};
use crate::structure::{self, ExtractError, Node};
use crate::timeline::{self, LoadError, Timeline};
use crate::SUPPORTED_EXTENSIONS;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Annotation error: {0}")]
    Annotations(#[from] AnnotationError),
    #[error("Scores directory {0} does not exist")]
    MissingScoresDir(PathBuf),
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a piece was left out of the corpus.
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error("no annotation record for this piece")]
    NoAnnotation,
    #[error("{0}")]
    Load(#[from] LoadError),
    #[error("malformed annotation tree: {0}")]
    Extract(#[from] ExtractError),
}

#[derive(Debug)]
pub struct PieceFailure {
    pub piece_id: String,
    pub path: PathBuf,
    pub cause: FailureCause,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Worker threads for parsing (must be > 0).
    pub jobs: usize,
    /// Per-file parse limit.
    pub parse_timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            parse_timeout: Duration::from_secs(60),
        }
    }
}

/// A parsed piece with its annotated section tree.
#[derive(Debug, Clone)]
pub struct Piece {
    pub id: String,
    pub path: PathBuf,
    pub timeline: Timeline,
    pub sections: Vec<Node>,
    pub mizans: BTreeSet<String>,
}

impl Piece {
    /// Slice `timeline` along the record's section tree.
    pub fn build(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        timeline: Timeline,
        record: &AnnotationRecord,
    ) -> Result<Self, ExtractError> {
        let sections = structure::extract_sections(&timeline, &record.sections)?;
        Ok(Self {
            id: id.into(),
            path: path.into(),
            timeline,
            sections,
            mizans: record.mizans(),
        })
    }
}

/// All successfully loaded pieces, keyed by piece id. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pieces: BTreeMap<String, Piece>,
}

impl Corpus {
    pub fn from_pieces(pieces: impl IntoIterator<Item = Piece>) -> Self {
        let mut map = BTreeMap::new();
        for piece in pieces {
            if let Some(old) = map.insert(piece.id.clone(), piece) {
                log::warn!("Piece id {} appears twice; keeping {}", old.id, old.path.display());
                map.insert(old.id.clone(), old);
            }
        }
        Self { pieces: map }
    }

    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    pub fn get(&self, id: &str) -> Option<&Piece> {
        self.pieces.get(id)
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

pub struct LoadReport {
    pub discovered: usize,
    pub loaded: usize,
    pub failures: Vec<PieceFailure>,
}

/// Piece id of a score file: its file stem.
pub fn piece_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Score files under `dir` (recursive), sorted by path.
pub fn discover_scores(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    if !dir.is_dir() {
        return Err(CorpusError::MissingScoresDir(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let ext = e
                .path()
                .extension()
                .and_then(|x| x.to_str())
                .unwrap_or("")
                .to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Read annotations, find score files and load every annotated piece.
pub fn load_corpus(
    scores_dir: &Path,
    annotations_path: &Path,
    opts: &LoadOptions,
) -> Result<(Corpus, LoadReport), CorpusError> {
    let records = annotations::load_annotations(annotations_path)?;
    log::info!(
        "Loaded {} annotation records from {}",
        records.len(),
        annotations_path.display()
    );
    let index = annotations::index_by_mbid(records);
    let files = discover_scores(scores_dir)?;
    build_corpus(&files, &index, opts)
}

/// Parse and slice each file in parallel. A failing piece is logged and
/// reported, never fatal.
pub fn build_corpus(
    files: &[PathBuf],
    index: &HashMap<String, AnnotationRecord>,
    opts: &LoadOptions,
) -> Result<(Corpus, LoadReport), CorpusError> {
    log::info!("Loading {} score files with {} workers", files.len(), opts.jobs);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    pb.set_message("Parsing scores...");

    let pool = rayon::ThreadPoolBuilder::new().num_threads(opts.jobs.max(1)).build()?;

    let results: Vec<Result<Piece, PieceFailure>> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let result = load_piece(path, index, opts.parse_timeout);
                pb.inc(1);
                result
            })
            .collect()
    });

    let mut pieces = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(piece) => pieces.push(piece),
            Err(failure) => {
                log::warn!(
                    "Skipping {} ({}): {}",
                    failure.piece_id,
                    failure.path.display(),
                    failure.cause
                );
                failures.push(failure);
            }
        }
    }

    let corpus = Corpus::from_pieces(pieces);
    pb.finish_with_message(format!("Done: {} loaded, {} skipped", corpus.len(), failures.len()));

    let report = LoadReport {
        discovered: files.len(),
        loaded: corpus.len(),
        failures,
    };
    Ok((corpus, report))
}

fn load_piece(
    path: &Path,
    index: &HashMap<String, AnnotationRecord>,
    timeout: Duration,
) -> Result<Piece, PieceFailure> {
    let id = piece_id(path);
    let fail = |cause: FailureCause| PieceFailure {
        piece_id: id.clone(),
        path: path.to_path_buf(),
        cause,
    };

    // Unannotated files are not parsed at all.
    let record = index.get(&id).ok_or_else(|| fail(FailureCause::NoAnnotation))?;

    log::debug!("Parsing {}", path.display());
    let timeline = timeline::load_timeline(path, timeout).map_err(|e| fail(e.into()))?;
    Piece::build(id.clone(), path, timeline, record).map_err(|e| fail(e.into()))
}
