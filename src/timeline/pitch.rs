use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PitchError {
    #[error("Not a pitch-class name: {0:?}")]
    InvalidName(String),
    #[error("Unsupported alteration: {0}")]
    UnsupportedAlter(f64),
}

// Letter, then an optional accidental. Quarter-tone spellings follow the
// score library convention: `~` half sharp, `` ` `` half flat.
static PITCH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<step>[A-Ga-g])(?P<acc>##|#~|#|~|--|-`|-|`|bb|b)?$").unwrap()
});

/// Octave-free pitch name ("C", "F#", "B-", "E`"), the atom of pattern matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchClass(String);

impl PitchClass {
    /// Parse a written pitch-class token. Case-insensitive; `b`/`bb` are
    /// accepted as flat spellings and normalized to `-`/`--`.
    pub fn parse(token: &str) -> Result<Self, PitchError> {
        let token = token.trim();
        let caps = PITCH_NAME_RE
            .captures(token)
            .ok_or_else(|| PitchError::InvalidName(token.to_string()))?;

        let step = caps["step"].to_ascii_uppercase();
        let accidental = match caps.name("acc").map(|m| m.as_str()) {
            None => "",
            Some("b") => "-",
            Some("bb") => "--",
            Some(other) => other,
        };
        Ok(Self(format!("{step}{accidental}")))
    }

    /// Build from a MusicXML `<step>` and `<alter>` (in semitones).
    pub fn from_step_alter(step: char, alter: f64) -> Result<Self, PitchError> {
        if !matches!(step.to_ascii_uppercase(), 'A'..='G') {
            return Err(PitchError::InvalidName(step.to_string()));
        }
        let half_steps = (alter * 2.0).round();
        if (half_steps - alter * 2.0).abs() > 1e-6 {
            return Err(PitchError::UnsupportedAlter(alter));
        }
        let accidental = match half_steps as i32 {
            0 => "",
            1 => "~",
            2 => "#",
            3 => "#~",
            4 => "##",
            -1 => "`",
            -2 => "-",
            -3 => "-`",
            -4 => "--",
            _ => return Err(PitchError::UnsupportedAlter(alter)),
        };
        Ok(Self(format!("{}{}", step.to_ascii_uppercase(), accidental)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
