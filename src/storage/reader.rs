//! Recording file reader

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::format::Recording;
use crate::{JukeboxError, Result};

/// Read and parse the recording at `path`
///
/// # Errors
///
/// Returns [`JukeboxError::RecordingNotFound`] when there is no file,
/// [`JukeboxError::InvalidFormat`] when it does not parse, and [`JukeboxError::Io`]
/// for any other read failure.
pub async fn read_recording(path: &Path) -> Result<Recording> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(JukeboxError::RecordingNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(JukeboxError::Io(e)),
    };

    let recording = Recording::from_yaml(&contents).map_err(|e| JukeboxError::InvalidFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    debug!(
        "Loaded recording {} ({} {})",
        path.display(),
        recording.request.method,
        recording.response.status
    );

    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");

        let result = read_recording(&path).await;
        assert!(matches!(result, Err(JukeboxError::RecordingNotFound(p)) if p == path));
    }

    #[tokio::test]
    async fn test_unparseable_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        std::fs::write(&path, "response: [not, a, recording").unwrap();

        let result = read_recording(&path).await;
        assert!(matches!(result, Err(JukeboxError::InvalidFormat { .. })));
    }
}
