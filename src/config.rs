use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::counter::PositionScheme;

/// Default prefix of mode names in group titles.
pub const DEFAULT_MODE_FAMILY: &str = "ṭab‘ al-māya";

/// Application configuration loaded from a TOML file.
/// Every key is optional; command-line flags take precedence.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory searched recursively for MusicXML scores.
    pub scores_dir: Option<PathBuf>,
    /// JSON annotation set.
    pub annotations: Option<PathBuf>,
    /// Pattern source file (json, yaml or toml).
    pub patterns: Option<PathBuf>,
    /// Where charts are written.
    pub output_dir: PathBuf,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    pub scheme: PositionScheme,
    /// Per-score parse limit in seconds.
    pub parse_timeout_secs: u64,
    pub mode_family: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scores_dir: None,
            annotations: None,
            patterns: None,
            output_dir: PathBuf::from("plots"),
            workers: 0,
            scheme: PositionScheme::default(),
            parse_timeout_secs: 60,
            mode_family: DEFAULT_MODE_FAMILY.to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from `explicit`, or from `~/.config/centoscan/config.toml`.
    /// Returns the default config if the file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load(explicit: Option<&Path>) -> Self {
        let config_path = explicit.map(Path::to_path_buf).or_else(Self::config_path);
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Some(path) if explicit.is_some() => {
                log::warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs.max(1))
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
