//! Recording file writer and its write guard

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::format::Recording;
use crate::config::{Config, WritePolicy, ENVIRONMENT_VAR};
use crate::{JukeboxError, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Decides whether recordings may be persisted in this process
#[derive(Debug, Clone)]
pub struct WriteGuard {
    policy: WritePolicy,
    checkout_dir: PathBuf,
}

impl WriteGuard {
    /// Create a guard
    #[must_use]
    pub fn new(policy: WritePolicy, checkout_dir: PathBuf) -> Self {
        Self {
            policy,
            checkout_dir,
        }
    }

    /// Guard that always allows writes
    #[must_use]
    pub fn always() -> Self {
        Self::new(WritePolicy::Always, PathBuf::from("."))
    }

    /// Guard that never allows writes
    #[must_use]
    pub fn never() -> Self {
        Self::new(WritePolicy::Never, PathBuf::from("."))
    }

    /// Build the guard described by the configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage.write_policy, config.checkout_dir())
    }

    /// Whether a write may happen now
    ///
    /// `LocalCheckout` requires a `.git` entry in the checkout directory and an
    /// environment other than `production`.
    #[must_use]
    pub fn allows_writes(&self) -> bool {
        match self.policy {
            WritePolicy::Always => true,
            WritePolicy::Never => false,
            WritePolicy::LocalCheckout => {
                self.checkout_dir.join(".git").exists() && !is_production()
            }
        }
    }
}

fn is_production() -> bool {
    std::env::var(ENVIRONMENT_VAR).is_ok_and(|env| env.trim().eq_ignore_ascii_case("production"))
}

/// Write (or overwrite) the recording at `path`, creating parent directories
///
/// The document is written to a sibling temporary file and renamed into place, so
/// concurrent writers of the same location never interleave.
///
/// # Errors
///
/// Returns error if serialization or any filesystem operation fails
pub async fn write_recording(path: &Path, recording: &Recording) -> Result<()> {
    let yaml = recording
        .to_yaml()
        .map_err(|e| JukeboxError::Other(format!("Failed to serialize recording: {e}")))?;

    let parent = path.parent().ok_or_else(|| {
        JukeboxError::Other(format!("Recording path has no parent: {}", path.display()))
    })?;
    tokio::fs::create_dir_all(parent).await?;

    let nonce = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(format!(".{}.{nonce}.tmp", process::id()));
    let temp_path = parent.join(temp_name);

    tokio::fs::write(&temp_path, yaml.as_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(JukeboxError::Io(e));
    }

    debug!("Wrote recording {} ({} bytes)", path.display(), yaml.len());
    Ok(())
}
