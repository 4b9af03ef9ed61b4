//! Mode dispatch for mock requests

use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, MockingMode};
use crate::fingerprint;
use crate::matching;
use crate::network::Transport;
use crate::recording::RecordResolver;
use crate::replay::PlaybackResolver;
use crate::storage::RecordingStore;
use crate::{JukeboxError, Result};

use super::{GetResponseOutput, ProxyRequest};

/// Resolves mock requests by playing back or recording, per request
pub struct ProxyOrchestrator {
    store: Arc<RecordingStore>,
    playback: PlaybackResolver,
    record: RecordResolver,
}

impl ProxyOrchestrator {
    /// Create an orchestrator from its resolvers
    #[must_use]
    pub fn new(store: Arc<RecordingStore>, record: RecordResolver) -> Self {
        Self {
            playback: PlaybackResolver::new(Arc::clone(&store)),
            store,
            record,
        }
    }

    /// Create the orchestrator described by the configuration
    #[must_use]
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(RecordingStore::from_config(config));
        let record = RecordResolver::from_config(config, Arc::clone(&store), transport);
        Self::new(store, record)
    }

    /// Recording store shared by both resolvers
    #[must_use]
    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    /// Resolve one mock request
    ///
    /// The recording location is derived from the album, the request URL and
    /// method, and the key of the first match entry the request satisfies.
    ///
    /// # Errors
    ///
    /// Returns error if the mode is disabled, or the album, URL or method
    /// cannot be mapped onto a recording location
    pub async fn get_response(&self, payload: &ProxyRequest) -> Result<GetResponseOutput> {
        let request = &payload.request;
        let selected = matching::evaluate(payload.match_criteria.as_ref(), request).selected();
        let key = fingerprint::derive_key(request, selected);
        let path = self
            .store
            .location(&payload.album, &request.url, &request.method, &key)?;

        debug!(
            "[mocking] {} {} {} -> {}",
            payload.mocking_mode,
            request.method,
            request.url,
            path.display()
        );

        let output = match payload.mocking_mode {
            MockingMode::Playback => self.playback.resolve(&request.url, &path).await,
            MockingMode::Recording => self.record.resolve(&request.url, request, &path).await,
            MockingMode::Disabled => {
                return Err(JukeboxError::InvalidMode(
                    MockingMode::Disabled.as_str().to_string(),
                ))
            }
        };

        Ok(output)
    }
}
