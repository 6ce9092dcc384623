//! Server configuration
//!
//! One TOML file with four optional sections (`server`, `content`, `tls`,
//! `api`). Anything left out falls back to the built-in defaults, which
//! match a stock checkout: `public/` served on ports 1900 (TLS) and 1901,
//! certificates under `server/`.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::policy::{AccessPolicy, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_HIDDEN_FILES};
use crate::{
    DEFAULT_CA_DOWNLOAD_NAME, DEFAULT_CA_MISSING_HINT, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT,
    DEFAULT_TELEMETRY_WINDOW_MS, MAX_BODY_BYTES,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,
    /// Served content and access policy
    pub content: ContentConfig,
    /// TLS certificate material
    pub tls: TlsConfig,
    /// JSON API settings
    pub api: ApiConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address shared by both listeners
    pub bind: IpAddr,
    /// TLS listener port
    pub https_port: u16,
    /// Plaintext listener port
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            https_port: DEFAULT_HTTPS_PORT,
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Content root and access policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Directory served as the site root
    pub root: PathBuf,
    /// CA certificate offered at `/ca.crt`
    pub ca_cert: PathBuf,
    /// File name suggested to browsers downloading the CA certificate
    pub ca_download_name: String,
    /// Message returned when the CA certificate does not exist
    pub ca_missing_hint: String,
    /// Basenames never served or listed
    pub hidden_files: Vec<String>,
    /// Extensions regular files must carry
    pub allowed_extensions: Vec<String>,
    /// Reject existing targets whose real path leaves the root
    pub confine_symlinks: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("public"),
            ca_cert: PathBuf::from("server/ca.crt"),
            ca_download_name: DEFAULT_CA_DOWNLOAD_NAME.into(),
            ca_missing_hint: DEFAULT_CA_MISSING_HINT.into(),
            hidden_files: DEFAULT_HIDDEN_FILES.iter().map(|s| s.to_string()).collect(),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confine_symlinks: true,
        }
    }
}

impl ContentConfig {
    /// Build the access policy described by this section
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.hidden_files.iter().cloned(), &self.allowed_extensions)
    }
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM certificate chain
    pub cert: PathBuf,
    /// PEM private key
    pub key: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert: PathBuf::from("server/server.crt"),
            key: PathBuf::from("server/server.key"),
        }
    }
}

/// JSON API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Telemetry freshness window in milliseconds
    pub telemetry_window_ms: u64,
    /// Largest accepted POST body in bytes
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            telemetry_window_ms: DEFAULT_TELEMETRY_WINDOW_MS,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

impl ApiConfig {
    pub fn telemetry_window(&self) -> Duration {
        Duration::from_millis(self.telemetry_window_ms)
    }
}

impl Config {
    /// Read `config.toml` from the platform config directory.
    ///
    /// Never fails: an unreadable or invalid file is reported and the
    /// built-in defaults are served instead.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            debug!("no platform config directory, serving with built-in defaults");
            return Self::default();
        };

        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("ignoring {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Read and validate a specific file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("{} does not exist, serving with built-in defaults", path.display());
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;

        info!("configuration read from {}", path.display());
        Ok(config)
    }

    /// Write the configuration, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;

        info!("configuration written to {}", path.display());
        Ok(())
    }

    /// Reject settings the listeners cannot honour together
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.http_port != 0 && server.http_port == server.https_port {
            return Err(ConfigError::Invalid(format!(
                "http_port and https_port are both {}",
                server.http_port
            )));
        }
        if self.api.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be positive".into()));
        }
        Ok(())
    }

    /// `.../streamoverlay/config.toml` under the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "streamoverlay", "streamoverlay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The default configuration rendered as TOML
    pub fn sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
