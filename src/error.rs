//! Error types for Jukebox

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Jukebox operations
pub type Result<T> = std::result::Result<T, JukeboxError>;

/// Errors that can occur in Jukebox
#[derive(Debug, Error)]
pub enum JukeboxError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error (missing album/routes, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A resolver was asked to act in a mode it cannot serve
    #[error("Mocking mode must be playback or recording, got {0}")]
    InvalidMode(String),

    /// Album name that cannot be used as a storage namespace
    #[error("Invalid album name: {0}")]
    InvalidAlbum(String),

    /// URL that cannot be mapped onto a recording location
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Method that is not a valid HTTP token
    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    /// No recording file at the expected location
    #[error("Recording not found: {}", .0.display())]
    RecordingNotFound(PathBuf),

    /// Recording file exists but could not be parsed
    #[error("Invalid recording format in {}: {reason}", path.display())]
    InvalidFormat {
        /// Recording file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Upstream call failed or timed out
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
