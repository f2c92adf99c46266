//! Section tree extraction: attach to every annotated span the slice of the
//! piece's timeline it covers.
//!
//! Nesting is section → sana → line → line-section. Deeper levels are
//! optional per node; a node with no child list is a [`Node::Leaf`].

use std::fmt;
use thiserror::Error;

use crate::annotations::RawNode;
use crate::timeline::Timeline;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("{level} {path} has no `{bound}` offset")]
    MissingBound {
        level: Level,
        path: String,
        bound: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Section,
    Sana,
    Line,
    LineSection,
}

impl Level {
    /// The level below this one and the raw child list that feeds it, if present.
    fn children_of(self, raw: &RawNode) -> Option<(Level, &[RawNode])> {
        match self {
            Level::Section => raw.sanai.as_deref().map(|c| (Level::Sana, c)),
            Level::Sana => raw.lines.as_deref().map(|c| (Level::Line, c)),
            Level::Line => raw.sections.as_deref().map(|c| (Level::LineSection, c)),
            Level::LineSection => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Section => "section",
            Level::Sana => "sana",
            Level::Line => "line",
            Level::LineSection => "line-section",
        })
    }
}

/// Half-open offset range `[start, end)` in quarter notes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

/// A structural unit together with its sub-timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub level: Level,
    pub span: Span,
    pub timeline: Timeline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Segment),
    Branch {
        segment: Segment,
        children: Vec<Node>,
    },
}

impl Node {
    pub fn segment(&self) -> &Segment {
        match self {
            Node::Leaf(segment) | Node::Branch { segment, .. } => segment,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Leaf(_) => &[],
            Node::Branch { children, .. } => children,
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.segment().timeline
    }

    pub fn level(&self) -> Level {
        self.segment().level
    }
}

/// Build the annotated section tree for one piece, depth-first, keeping
/// input order at every level.
///
/// Every span is sliced from the whole piece timeline, not from its parent,
/// so a child that overhangs its parent still gets its full span.
pub fn extract_sections(
    timeline: &Timeline,
    sections: &[RawNode],
) -> Result<Vec<Node>, ExtractError> {
    extract_level(timeline, sections, Level::Section, &[])
}

fn extract_level(
    timeline: &Timeline,
    raws: &[RawNode],
    level: Level,
    parent_path: &[usize],
) -> Result<Vec<Node>, ExtractError> {
    raws.iter()
        .enumerate()
        .map(|(i, raw)| {
            let mut path = parent_path.to_vec();
            path.push(i + 1);
            extract_node(timeline, raw, level, &path)
        })
        .collect()
}

fn extract_node(
    timeline: &Timeline,
    raw: &RawNode,
    level: Level,
    path: &[usize],
) -> Result<Node, ExtractError> {
    let span = read_span(raw, level, path)?;
    let segment = Segment {
        level,
        span,
        timeline: timeline.slice(span.start, span.end),
    };
    log::trace!(
        "{} {} [{}, {}): {} events",
        level,
        format_path(path),
        span.start,
        span.end,
        segment.timeline.len()
    );

    match level.children_of(raw) {
        Some((child_level, raw_children)) => Ok(Node::Branch {
            segment,
            children: extract_level(timeline, raw_children, child_level, path)?,
        }),
        None => Ok(Node::Leaf(segment)),
    }
}

fn read_span(raw: &RawNode, level: Level, path: &[usize]) -> Result<Span, ExtractError> {
    let missing = |bound| ExtractError::MissingBound {
        level,
        path: format_path(path),
        bound,
    };
    let start = raw.start.ok_or_else(|| missing("start"))?;
    let end = raw.end.ok_or_else(|| missing("end"))?;
    if end < start {
        // Sliced as given, which yields no events.
        log::warn!(
            "{} {} ends at {} before it starts at {}; treating it as empty",
            level,
            format_path(path),
            end,
            start
        );
    }
    Ok(Span { start, end })
}

fn format_path(path: &[usize]) -> String {
    path.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(".")
}

/// Node counts per level for one piece.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureSummary {
    pub sections: usize,
    pub sanai: usize,
    pub lines: usize,
    pub line_sections: usize,
    /// Pitched events across all top-level sections.
    pub pitched_events: usize,
    /// Line count of each sana, in performance order.
    pub lines_per_sana: Vec<usize>,
}

pub fn summarize(sections: &[Node]) -> StructureSummary {
    let mut summary = StructureSummary {
        sections: sections.len(),
        ..StructureSummary::default()
    };

    for section in sections {
        summary.pitched_events += section.timeline().pitched_len();
        for sana in section.children() {
            summary.sanai += 1;
            summary.lines_per_sana.push(sana.children().len());
            for line in sana.children() {
                summary.lines += 1;
                summary.line_sections += line.children().len();
            }
        }
    }

    summary
}
