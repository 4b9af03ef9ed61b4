//! Configuration types for Jukebox

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::{JukeboxError, Result};

/// Environment variable consulted by [`WritePolicy::LocalCheckout`]
pub const ENVIRONMENT_VAR: &str = "JUKEBOX_ENV";

/// Operating mode of a mocking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockingMode {
    /// Requests pass through untouched
    #[default]
    Disabled,
    /// Serve saved recordings
    Playback,
    /// Proxy live requests and save them
    Recording,
}

impl MockingMode {
    /// Lowercase name, as used on the wire
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Playback => "playback",
            Self::Recording => "recording",
        }
    }

    /// Whether requests are intercepted at all in this mode
    #[must_use]
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for MockingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory holding one sub-directory per album
    #[serde(default = "default_recording_dir")]
    pub recording_dir: PathBuf,
    /// Proxy endpoint settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Write guard settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Live call settings used while recording
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Header redaction for persisted recordings
    #[serde(default)]
    pub redaction: RedactionConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recording_dir: default_recording_dir(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            upstream: UpstreamConfig::default(),
            redaction: RedactionConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

fn default_recording_dir() -> PathBuf {
    PathBuf::from("mock-recordings").join("recordings")
}

/// Proxy endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the endpoint listens on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Path accepting mock requests
    #[serde(default = "default_mock_path")]
    pub mock_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            mock_path: default_mock_path(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4001))
}

fn default_mock_path() -> String {
    "/mock".to_string()
}

/// When recordings may be written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Only inside a local git checkout outside production
    #[default]
    LocalCheckout,
    /// Unconditionally
    Always,
    /// Never; recording mode still proxies but persists nothing
    Never,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Write guard
    #[serde(default)]
    pub write_policy: WritePolicy,
    /// Directory checked for a `.git` marker; defaults to the working directory
    #[serde(default)]
    pub checkout_dir: Option<PathBuf>,
}

/// Upstream (live call) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Upper bound on one live call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Header names stripped from persisted recordings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Request headers never written to disk
    #[serde(default = "default_request_denylist")]
    pub request_headers: Vec<String>,
    /// Response headers never written to disk
    #[serde(default)]
    pub response_headers: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            request_headers: default_request_denylist(),
            response_headers: Vec::new(),
        }
    }
}

impl RedactionConfig {
    /// Request headers stripped before persisting: the configured list plus
    /// [`ALWAYS_REDACTED_REQUEST_HEADERS`], which no configuration can drop
    #[must_use]
    pub fn request_denylist(&self) -> Vec<String> {
        let mut denylist = self.request_headers.clone();
        for name in ALWAYS_REDACTED_REQUEST_HEADERS {
            if !denylist.iter().any(|denied| denied.eq_ignore_ascii_case(name)) {
                denylist.push(name.to_string());
            }
        }
        denylist
    }
}

/// Request headers never written to a recording
pub const ALWAYS_REDACTED_REQUEST_HEADERS: [&str; 2] = ["authorization", "cookie"];

fn default_request_denylist() -> Vec<String> {
    ALWAYS_REDACTED_REQUEST_HEADERS
        .iter()
        .map(|name| (*name).to_string())
        .collect()
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Maximum request size in bytes
    pub max_request_size: usize,
    /// Maximum response size in bytes
    pub max_response_size: usize,
    /// Maximum headers per request/response
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
            max_headers: 128,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| JukeboxError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| JukeboxError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.recording_dir.as_os_str().is_empty() {
            return Err(JukeboxError::Config(
                "recording_dir cannot be empty".to_string(),
            ));
        }

        if !self.server.mock_path.starts_with('/') {
            return Err(JukeboxError::Config(format!(
                "server.mock_path must start with '/': {}",
                self.server.mock_path
            )));
        }

        if self.upstream.timeout_ms == 0 {
            return Err(JukeboxError::Config(
                "upstream.timeout_ms must be > 0".to_string(),
            ));
        }

        let limits = [
            ("max_connections", self.limits.max_connections),
            ("max_request_size", self.limits.max_request_size),
            ("max_response_size", self.limits.max_response_size),
            ("max_headers", self.limits.max_headers),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(JukeboxError::Config(format!("limits.{name} must be > 0")));
            }
        }

        Ok(())
    }

    /// Directory checked for the `.git` marker
    #[must_use]
    pub fn checkout_dir(&self) -> PathBuf {
        self.storage
            .checkout_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(
            config.recording_dir,
            PathBuf::from("mock-recordings/recordings")
        );
        assert_eq!(config.server.mock_path, "/mock");
        assert_eq!(config.storage.write_policy, WritePolicy::LocalCheckout);
        assert_eq!(config.upstream.timeout_ms, 30_000);
        assert_eq!(
            config.redaction.request_headers,
            vec!["authorization", "cookie"]
        );
        assert!(config.redaction.response_headers.is_empty());
    }

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            recording_dir = "/tmp/recordings"

            [server]
            listen = "0.0.0.0:9000"
            mock_path = "/__mock"

            [storage]
            write_policy = "always"

            [upstream]
            timeout_ms = 500
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.server.mock_path, "/__mock");
        assert_eq!(config.storage.write_policy, WritePolicy::Always);
        assert_eq!(config.upstream.timeout_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            recording_dir = "fixtures"

            [storage]
            write_policy = "never"
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.storage.write_policy, WritePolicy::Never);
        assert_eq!(config.recording_dir, PathBuf::from("fixtures"));
    }

    #[test]
    fn test_invalid_mock_path() {
        let config: Config = toml::from_str("[server]\nmock_path = \"mock\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_zero_limit() {
        let mut config = Config::default();
        config.limits.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_denylist_keeps_mandatory_names() {
        let config: Config =
            toml::from_str("[redaction]\nrequest_headers = []").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.redaction.request_denylist(),
            vec!["authorization", "cookie"]
        );

        let config: Config =
            toml::from_str("[redaction]\nrequest_headers = [\"Cookie\", \"x-api-key\"]").unwrap();
        assert_eq!(
            config.redaction.request_denylist(),
            vec!["Cookie", "x-api-key", "authorization"]
        );
    }

    #[test]
    fn test_mode_wire_names() {
        let mode: MockingMode = serde_json::from_str("\"playback\"").unwrap();
        assert_eq!(mode, MockingMode::Playback);
        assert_eq!(MockingMode::Recording.to_string(), "recording");
        assert!(serde_json::from_str::<MockingMode>("\"replay\"").is_err());
        assert!(!MockingMode::default().is_enabled());
    }
}
