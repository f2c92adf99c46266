pub mod aggregate;
pub mod annotations;
pub mod config;
pub mod corpus;
pub mod counter;
pub mod patterns;
#[cfg(feature = "plots")]
pub mod plot;
pub mod report;
pub mod structure;
pub mod timeline;

/// Score file extensions we read (uncompressed MusicXML)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xml", "musicxml"];

/// Application name for XDG paths
pub const APP_NAME: &str = "centoscan";
