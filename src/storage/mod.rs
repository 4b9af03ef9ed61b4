//! Recording store: a directory tree of YAML documents
//!
//! Layout: `root/album/host/encoded-path/method/key.yaml`, where `encoded-path` is the URL
//! path without its leading slash, percent-encoded into a single segment.

mod format;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

use hyper::{Method, Uri};
use tracing::debug;

pub use format::{RecordedRequest, RecordedResponse, Recording, RECORDING_EXTENSION};
pub use reader::read_recording;
pub use writer::{write_recording, WriteGuard};

use crate::config::Config;
use crate::{JukeboxError, Result};

/// Outcome of [`RecordingStore::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The recording was written
    Written,
    /// The write guard refused; nothing was touched
    Skipped,
}

/// File-backed recording store
#[derive(Debug, Clone)]
pub struct RecordingStore {
    root: PathBuf,
    guard: WriteGuard,
}

impl RecordingStore {
    /// Create a store rooted at `root`
    #[must_use]
    pub fn new(root: PathBuf, guard: WriteGuard) -> Self {
        Self { root, guard }
    }

    /// Create the store described by the configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.recording_dir.clone(), WriteGuard::from_config(config))
    }

    /// Storage root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the recording for a request
    ///
    /// # Errors
    ///
    /// Returns error if the album is not a valid namespace, the URL has no host,
    /// or the method is not a valid HTTP method
    pub fn location(&self, album: &str, url: &str, method: &str, key: &str) -> Result<PathBuf> {
        recording_location(&self.root, album, url, method, key)
    }

    /// Read the recording at `path`
    ///
    /// # Errors
    ///
    /// See [`read_recording`]
    pub async fn read(&self, path: &Path) -> Result<Recording> {
        read_recording(path).await
    }

    /// Write the recording at `path`, if the write guard allows it
    ///
    /// # Errors
    ///
    /// Returns error if the guard allowed the write and it failed
    pub async fn write(&self, path: &Path, recording: &Recording) -> Result<WriteOutcome> {
        if !self.guard.allows_writes() {
            debug!(
                "Write guard refused to persist {} (not a local checkout, or production)",
                path.display()
            );
            return Ok(WriteOutcome::Skipped);
        }

        write_recording(path, recording).await?;
        Ok(WriteOutcome::Written)
    }
}

/// Compute `root/album/host/encoded-path/method/key.yaml`
///
/// # Errors
///
/// Returns error if the album is not a valid namespace, the URL has no host,
/// or the method is not a valid HTTP method
pub fn recording_location(
    root: &Path,
    album: &str,
    url: &str,
    method: &str,
    key: &str,
) -> Result<PathBuf> {
    validate_album(album)?;

    let uri = url.parse::<Uri>().map_err(|e| JukeboxError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let host = uri
        .host()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| JukeboxError::InvalidUrl {
            url: url.to_string(),
            reason: "URL has no host".to_string(),
        })?
        .to_ascii_lowercase();

    let method = method
        .parse::<Method>()
        .map_err(|_| JukeboxError::InvalidMethod(method.to_string()))?;

    let mut path = root.join(album).join(host);
    let encoded = encode_path_segment(uri.path());
    if !encoded.is_empty() {
        path.push(encoded);
    }
    path.push(method.as_str().to_ascii_lowercase());
    path.push(format!("{key}.{RECORDING_EXTENSION}"));

    Ok(path)
}

/// Characters `encodeURIComponent` leaves as-is but `urlencoding` escapes
const UNRESERVED_MARKS: [(&str, &str); 5] = [
    ("%21", "!"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2A", "*"),
];

/// URL path without the leading slash, percent-encoded into one segment
///
/// Matches `encodeURIComponent`, so directories line up with fixtures recorded by
/// JavaScript tooling.
fn encode_path_segment(path: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        other => UNRESERVED_MARKS.iter().fold(
            urlencoding::encode(other).into_owned(),
            |encoded, (escaped, mark)| encoded.replace(escaped, mark),
        ),
    }
}

/// Validate an album name
///
/// # Errors
///
/// Returns error if the album cannot safely be used as a directory name
pub fn validate_album(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(JukeboxError::InvalidAlbum(
            "Album name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(JukeboxError::InvalidAlbum(format!(
            "Album name too long: {} > 255",
            name.len()
        )));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(JukeboxError::InvalidAlbum(
            "Album name cannot contain path separators".to_string(),
        ));
    }

    if name.starts_with('.') {
        return Err(JukeboxError::InvalidAlbum(
            "Album name cannot start with dot".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(JukeboxError::InvalidAlbum(
            "Album name cannot contain null bytes".to_string(),
        ));
    }

    Ok(())
}
