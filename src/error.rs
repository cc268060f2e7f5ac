//! Error types for the show builder.
//!
//! `BuildError` is what a build reports to its caller. `BufferError` covers the
//! PCM primitives in `buffer`; it is folded into `BuildError` where a buffer
//! failure is fatal and swallowed (with a warning) where it is not.

use crate::freshness::StaleSegment;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the in-memory buffer primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error(
        "format mismatch: {left_rate} Hz/{left_channels} ch vs {right_rate} Hz/{right_channels} ch"
    )]
    FormatMismatch {
        left_rate: u32,
        left_channels: u16,
        right_rate: u32,
        right_channels: u16,
    },

    #[error("cannot loop an empty buffer")]
    Empty,
}

/// Main error type for show builds.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{what} folder not found: {}", .path.display())]
    MissingFolder { what: &'static str, path: PathBuf },

    #[error("No {0} found")]
    NoAssetsFound(String),

    #[error("{} file(s) too old: {}", .0.len(), describe_stale(.0))]
    StaleAssets(Vec<StaleSegment>),

    #[error("Could not decode '{}': {reason}", .path.display())]
    DecodeFailure { path: PathBuf, reason: String },

    #[error("Ducking failed: {0}")]
    DuckingFailure(BufferError),

    #[error("Audio assembly failed: {0}")]
    Buffer(#[from] BufferError),

    #[error("A build is already in progress")]
    BuildAlreadyInProgress,

    #[error("Export to '{}' failed: {reason}", .path.display())]
    Export { path: PathBuf, reason: String },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for show builds.
pub type Result<T> = std::result::Result<T, BuildError>;

fn describe_stale(stale: &[StaleSegment]) -> String {
    stale
        .iter()
        .map(|s| format!("{} ({:.1} min)", s.identifier, s.age_minutes))
        .collect::<Vec<_>>()
        .join(", ")
}
