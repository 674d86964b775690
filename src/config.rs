// Configuration schema for the gateway client.

use std::{
    env, fmt, fs,
    io::{self, Read},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CREDENTIALS_FILE: &str = "veilgate-credentials.json";

/// Error returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when reading a configuration file from disk.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// Error when parsing the configuration contents.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration did not pass validation checks.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Key exchange strategy, chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// Negotiated per-session symmetric key, identified by `X-Key-Id`.
    #[default]
    Session,
    /// Legacy per-call key generation, RSA-wrapped into `X-Enc-Key`.
    Bootstrap,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Session => f.write_str("session"),
            KeyMode::Bootstrap => f.write_str("bootstrap"),
        }
    }
}

/// Client configuration loaded at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Gateway base URL, e.g. `https://api.example.com/gw`.
    pub base_url: String,
    /// HTTP timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Key exchange mode.
    #[serde(default)]
    pub mode: KeyMode,
    /// Initial RSA public key PEM; fetched from the gateway when absent.
    #[serde(default)]
    pub public_key_pem: Option<String>,
    /// Fallback RSA public key PEM tried when the configured key fails.
    /// Defaults to the baked-in production key.
    #[serde(default)]
    pub fallback_public_key_pem: Option<String>,
    /// Path of the persisted credential file.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Enables verbose request/response tracing.
    #[serde(default)]
    pub debug: bool,
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            mode: KeyMode::default(),
            public_key_pem: None,
            fallback_public_key_pem: None,
            credentials_path: None,
            debug: false,
        }
    }

    /// Loads configuration from the file named by `VEILGATE_CONFIG`.
    ///
    /// Unlike schemas where defaults suffice, a gateway URL is mandatory, so
    /// a missing variable is a validation error.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var("VEILGATE_CONFIG") {
            Ok(path) => Self::from_path(path),
            Err(_missing) => Err(ConfigError::Validation(
                "VEILGATE_CONFIG is not set and no base_url is available".into(),
            )),
        }
    }

    /// Loads a configuration file from the provided path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from any reader implementing [`Read`].
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ConfigError> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(|source| ConfigError::Io {
                path: PathBuf::from("<reader>"),
                source,
            })?;
        Self::from_toml_str(&buf)
    }

    /// Loads configuration from a TOML string slice.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        <Self as FromStr>::from_str(input)
    }

    /// HTTP timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolved credential file path.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE))
    }

    /// Validates the configuration, returning an error when constraints are
    /// violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("base_url must be set".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "base_url must start with http:// or https://".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation("timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

impl FromStr for ClientConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
