//! Corpus-wide cento position counts.
//!
//! Counting runs per sana and per line of every piece and yields a nested
//! `piece → label → pattern → counts` table. That is reshaped into one
//! [`PositionTable`] per (pattern source, level, mode) title, merged per
//! pattern source, and finally row-normalized into a [`Distribution`].
//! Tables stay keyed by their source name throughout, so grouping never
//! depends on parsing titles.

pub mod table;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::corpus::{Corpus, Piece};
use crate::counter::{self, Bucketing, PositionCounts, PositionScheme};
use crate::patterns::{Pattern, PatternSource};
use crate::timeline::Timeline;

pub use table::{
    Distribution, PositionTable, merge_by_group, normalize_and_total, normalize_row,
};

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Cannot combine {left:?} and {right:?} position tables")]
    SchemeMismatch {
        left: PositionScheme,
        right: PositionScheme,
    },
    #[error("Row {pattern:?} has {got} buckets but {scheme:?} tables have {expected}")]
    ColumnMismatch {
        pattern: String,
        scheme: PositionScheme,
        expected: usize,
        got: usize,
    },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Pattern key → counts, for one structural unit.
pub type PatternCounts = BTreeMap<String, PositionCounts>;

/// Counts for every sana and every line of one piece, keyed by labels like
/// `section_2_sana_1` and `section_2_sana_1_line_3`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PieceCounts {
    pub sanai: BTreeMap<String, PatternCounts>,
    pub lines: BTreeMap<String, PatternCounts>,
}

impl PieceCounts {
    pub fn level(&self, level: Granularity) -> &BTreeMap<String, PatternCounts> {
        match level {
            Granularity::Sanai => &self.sanai,
            Granularity::Lines => &self.lines,
        }
    }
}

pub type CorpusCounts = BTreeMap<String, PieceCounts>;

/// Which structural units a table aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Sanai,
    Lines,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Sanai, Granularity::Lines];

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Sanai => "sanai",
            Granularity::Lines => "lines",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count every pattern in one unit. Pitch names are extracted once so all
/// patterns share the same index space. Patterns with equal keys collapse.
pub fn count_all<B: Bucketing + ?Sized>(
    timeline: &Timeline,
    patterns: &[Pattern],
    scheme: &B,
) -> PatternCounts {
    let names = timeline.pitch_names();
    patterns
        .iter()
        .map(|p| (p.key().to_string(), counter::count_in_names(&names, p.notes(), scheme)))
        .collect()
}

/// Count every sana and line of a piece. Section numbers count all
/// top-level sections; sana and line numbers restart under each parent.
pub fn count_piece<B: Bucketing + ?Sized>(
    piece: &Piece,
    patterns: &[Pattern],
    scheme: &B,
) -> PieceCounts {
    let mut counts = PieceCounts::default();

    for (s, section) in piece.sections.iter().enumerate() {
        for (m, sana) in section.children().iter().enumerate() {
            let sana_label = format!("section_{}_sana_{}", s + 1, m + 1);
            counts
                .sanai
                .insert(sana_label.clone(), count_all(sana.timeline(), patterns, scheme));

            for (k, line) in sana.children().iter().enumerate() {
                let line_label = format!("{}_line_{}", sana_label, k + 1);
                counts
                    .lines
                    .insert(line_label, count_all(line.timeline(), patterns, scheme));
            }
        }
    }

    log::debug!(
        "{}: {} sanai, {} lines counted",
        piece.id,
        counts.sanai.len(),
        counts.lines.len()
    );
    counts
}

/// Count every piece, in parallel on the current rayon pool.
pub fn count_corpus<B: Bucketing + Sync + ?Sized>(
    corpus: &Corpus,
    patterns: &[Pattern],
    scheme: &B,
) -> CorpusCounts {
    let pieces: Vec<&Piece> = corpus.pieces().collect();
    pieces
        .par_iter()
        .map(|piece| (piece.id.clone(), count_piece(piece, patterns, scheme)))
        .collect()
}

/// `"<family> <mizan>, <mizan>"`, or just the family when no mizan is known.
///
/// Mizans come sorted and are comma-separated, so a piece with several
/// modes reads `"ṭab‘ al-māya basīṭ, qāyim wa-nuṣf"` rather than the
/// run-together, set-ordered `"ṭab‘ al-māya basīṭqāyim wa-nuṣf"` of older
/// reports. Titles from the two differ for multi-mizan pieces only.
pub fn mode_name(family: &str, mizans: &BTreeSet<String>) -> String {
    if mizans.is_empty() {
        family.to_string()
    } else {
        let joined: Vec<&str> = mizans.iter().map(String::as_str).collect();
        format!("{} {}", family, joined.join(", "))
    }
}

pub fn group_title(source: &str, level: Granularity, mode: &str) -> String {
    format!("{} : {} of {}", source.trim(), level, mode)
}

/// Titled tables for both levels of one pattern source.
#[derive(Debug, Clone, Default)]
pub struct LevelTables {
    pub sanai: BTreeMap<String, PositionTable>,
    pub lines: BTreeMap<String, PositionTable>,
}

impl LevelTables {
    fn level_mut(&mut self, level: Granularity) -> &mut BTreeMap<String, PositionTable> {
        match level {
            Granularity::Sanai => &mut self.sanai,
            Granularity::Lines => &mut self.lines,
        }
    }
}

/// Reshape one source's counts into tables titled by source, level and
/// mode. Pieces sharing a mode share a title and are summed together.
pub fn titled_tables(
    source: &PatternSource,
    counts: &CorpusCounts,
    corpus: &Corpus,
    scheme: PositionScheme,
    family: &str,
) -> Result<LevelTables, AggregateError> {
    let mut tables = LevelTables::default();
    let no_mizans = BTreeSet::new();

    for (piece_id, piece_counts) in counts {
        let mizans = corpus.get(piece_id).map(|p| &p.mizans).unwrap_or(&no_mizans);
        let mode = mode_name(family, mizans);

        for level in Granularity::ALL {
            let table = PositionTable::from_node_counts(scheme, piece_counts.level(level))?;
            tables
                .level_mut(level)
                .entry(group_title(&source.name, level, &mode))
                .or_insert_with(|| PositionTable::new(scheme))
                .merge(&table)?;
        }
    }

    Ok(tables)
}

/// Source name → title → table.
pub type SourceTables = BTreeMap<String, BTreeMap<String, PositionTable>>;

/// Everything derived for one level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelAnalysis {
    /// Per source, one table per mode title.
    pub tables: SourceTables,
    /// Source name → table merged over all modes.
    pub groups: BTreeMap<String, PositionTable>,
    pub distribution: Distribution,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub scheme: PositionScheme,
    pub sanai: LevelAnalysis,
    pub lines: LevelAnalysis,
}

impl Analysis {
    pub fn level(&self, level: Granularity) -> &LevelAnalysis {
        match level {
            Granularity::Sanai => &self.sanai,
            Granularity::Lines => &self.lines,
        }
    }
}

/// Run counting, titling, merging and normalization for every source.
pub fn analyze(
    corpus: &Corpus,
    sources: &[PatternSource],
    scheme: PositionScheme,
    jobs: usize,
    family: &str,
) -> Result<Analysis, AggregateError> {
    log::info!(
        "Counting {} pattern sources over {} pieces ({:?} buckets, {} workers)",
        sources.len(),
        corpus.len(),
        scheme,
        jobs
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs.max(1)).build()?;

    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} sources {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let mut sanai_tables = SourceTables::new();
    let mut line_tables = SourceTables::new();

    for source in sources {
        pb.set_message(source.name.clone());
        let counts = pool.install(|| count_corpus(corpus, &source.patterns, &scheme));
        let titled = titled_tables(source, &counts, corpus, scheme, family)?;
        if sanai_tables.contains_key(&source.name) {
            log::warn!("Pattern source {:?} given twice; later one wins", source.name);
        }
        sanai_tables.insert(source.name.clone(), titled.sanai);
        line_tables.insert(source.name.clone(), titled.lines);
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(Analysis {
        scheme,
        sanai: level_analysis(scheme, sanai_tables)?,
        lines: level_analysis(scheme, line_tables)?,
    })
}

fn level_analysis(
    scheme: PositionScheme,
    tables: SourceTables,
) -> Result<LevelAnalysis, AggregateError> {
    let groups = merge_by_group(scheme, &tables)?;
    let distribution = normalize_and_total(scheme, &groups)?;
    Ok(LevelAnalysis {
        tables,
        groups,
        distribution,
    })
}
