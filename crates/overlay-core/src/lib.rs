//! Overlay Core - path confinement, access policy and directory listings
//!
//! This crate contains everything that decides what a client may see on disk.
//! It has no dependencies on networking code.

pub mod config;
pub mod error;
pub mod listing;
pub mod path;
pub mod policy;

pub use config::{ApiConfig, Config, ConfigError, ContentConfig, ServerConfig, TlsConfig};
pub use error::*;
pub use listing::{list_directory, render_html, ListingEntry};
pub use path::{Resolved, Resolver, TargetKind};
pub use policy::{AccessPolicy, EntryKind};

/// Request route that downloads the CA certificate
pub const CA_ROUTE: &str = "/ca.crt";

/// Maximum decoded request path length in bytes
pub const MAX_PATH_LEN: usize = 4096;

/// Default HTTPS listener port
pub const DEFAULT_HTTPS_PORT: u16 = 1900;

/// Default plaintext listener port
pub const DEFAULT_HTTP_PORT: u16 = 1901;

/// Default telemetry freshness window in milliseconds
pub const DEFAULT_TELEMETRY_WINDOW_MS: u64 = 5_000;

/// Maximum accepted API request body (1 MB)
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// File name browsers are offered for the CA certificate download
pub const DEFAULT_CA_DOWNLOAD_NAME: &str = "StreamOverlay-CA.crt";

/// Body of the 404 returned when the CA certificate does not exist
pub const DEFAULT_CA_MISSING_HINT: &str =
    "CA certificate not found. Generate certificates with your key-management tooling.";
