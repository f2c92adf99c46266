pub mod musicxml;
pub mod pitch;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use pitch::{PitchClass, PitchError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Parse error: {0}")]
    Parse(#[from] musicxml::ParseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parser timed out after {0:?}")]
    Timeout(Duration),
    #[error("Parser aborted: {0}")]
    Aborted(String),
}

/// What sounds (or doesn't) at an offset.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Note(PitchClass),
    Chord(Vec<PitchClass>),
    Rest,
}

/// One element of a flattened part. Offsets and durations are in quarter notes.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub offset: f64,
    pub duration: f64,
    pub kind: EventKind,
}

impl Event {
    pub fn note(offset: f64, duration: f64, pitch: PitchClass) -> Self {
        Self {
            offset,
            duration,
            kind: EventKind::Note(pitch),
        }
    }

    pub fn rest(offset: f64, duration: f64) -> Self {
        Self {
            offset,
            duration,
            kind: EventKind::Rest,
        }
    }

    /// Pitch class if this is a single note; chords and rests have none.
    pub fn pitch(&self) -> Option<&PitchClass> {
        match &self.kind {
            EventKind::Note(p) => Some(p),
            _ => None,
        }
    }
}

/// Offset-ordered notes and rests of a single part. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    events: Vec<Event>,
}

impl Timeline {
    /// Build from events in any order; sorting is stable so simultaneous
    /// events keep their document order.
    pub fn from_events(mut events: Vec<Event>) -> Self {
        events.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events with `start <= offset < end`, in order.
    pub fn slice(&self, start: f64, end: f64) -> Timeline {
        let lo = self.events.partition_point(|e| e.offset < start);
        let hi = self.events.partition_point(|e| e.offset < end).max(lo);
        Timeline {
            events: self.events[lo..hi].to_vec(),
        }
    }

    /// Pitch names of single notes only, in order. This is the sequence
    /// patterns are matched against; its length is the N of position buckets.
    pub fn pitch_names(&self) -> Vec<PitchClass> {
        self.events.iter().filter_map(|e| e.pitch().cloned()).collect()
    }

    pub fn pitched_len(&self) -> usize {
        self.events.iter().filter(|e| e.pitch().is_some()).count()
    }
}

/// Parse a score file into its first part's timeline, giving up after `timeout`.
///
/// The parse runs on a blocking thread owned by a throwaway runtime; on
/// timeout the runtime is shut down in the background and the stuck thread
/// is abandoned rather than joined.
pub fn load_timeline(path: &Path, timeout: Duration) -> Result<Timeline, LoadError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let owned: PathBuf = path.to_path_buf();
    let outcome = rt.block_on(async move {
        let task = tokio::task::spawn_blocking(move || musicxml::load_file(&owned));
        tokio::time::timeout(timeout, task).await
    });
    rt.shutdown_background();

    match outcome {
        Ok(Ok(parsed)) => Ok(parsed?),
        Ok(Err(join_err)) => Err(LoadError::Aborted(join_err.to_string())),
        Err(_) => Err(LoadError::Timeout(timeout)),
    }
}
