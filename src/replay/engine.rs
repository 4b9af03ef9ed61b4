//! Playback: serve a saved recording, or a synthetic 404 when there is none

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::proxy::{GetResponseOutput, Source};
use crate::storage::RecordingStore;
use crate::JukeboxError;

/// Resolves mock requests from the recording store
pub struct PlaybackResolver {
    store: Arc<RecordingStore>,
}

impl PlaybackResolver {
    /// Create a playback resolver
    #[must_use]
    pub fn new(store: Arc<RecordingStore>) -> Self {
        Self { store }
    }

    /// Return the recording at `path`, or the not-found response
    ///
    /// Never fails: a missing or unreadable recording is reported in the response body.
    pub async fn resolve(&self, url: &str, path: &Path) -> GetResponseOutput {
        match self.store.read(path).await {
            Ok(recording) => {
                debug!("Playback hit: {} -> {}", url, path.display());
                GetResponseOutput {
                    status: recording.response.status,
                    headers: recording.response.headers,
                    body: recording.response.body,
                    source: Source::Recording(path.to_path_buf()),
                }
            }
            Err(e) => {
                let output = not_found_output(url, path);
                match e {
                    JukeboxError::RecordingNotFound(_) => {
                        error!("[mocking] No recording available for {url}; expected valid file at {}", path.display());
                    }
                    other => {
                        error!(
                            "[mocking] No recording available for {url}; {} could not be used: {other}",
                            path.display()
                        );
                    }
                }
                output
            }
        }
    }
}

/// The synthetic response served when no usable recording exists
#[must_use]
pub fn not_found_output(url: &str, path: &Path) -> GetResponseOutput {
    let message = format!(
        "No recording available for {url}; expected valid file at {}",
        path.display()
    );

    GetResponseOutput {
        status: 404,
        headers: BTreeMap::new(),
        body: Some(format!("{{\n\t\"error\": {}\n}}", Value::String(message))),
        source: Source::NoneFound,
    }
}
