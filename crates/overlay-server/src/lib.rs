//! Overlay Server - dual HTTP/HTTPS front end
//!
//! This crate provides:
//! - The request router: static files from the confined content root, the
//!   CA certificate download, and the small JSON signaling API
//! - TLS material loading for the HTTPS listener
//! - Plaintext and TLS listeners that share one router but run and fail
//!   independently
//!
//! # Architecture
//!
//! ```text
//!   :1901 plaintext ──┐                      ┌─> Resolver ─> filesystem
//!                     ├─> Router::serve ─────┤
//!   :1900 TLS ────────┘   (one task per      └─> API handlers ─> stores
//!                          connection)
//! ```

pub mod access_log;
pub mod listener;
pub mod response;
pub mod router;
pub mod server;
pub mod tls;

pub use access_log::AccessLog;
pub use listener::{Listener, Scheme};
pub use router::{ApiRoute, Router};
pub use server::{RunningServer, Server, ServerError};
pub use tls::{load_tls_config, TlsError};

/// `Content-Type` of the CA certificate download
pub const CA_CONTENT_TYPE: &str = "application/x-x509-ca-cert";
