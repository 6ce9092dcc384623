//! TLS material for the HTTPS listener
//!
//! Certificate chain and private key are PEM files on disk. Missing files
//! are reported separately from unusable ones so the caller can keep the
//! plaintext listener running and tell the operator what to generate.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use thiserror::Error;
use tracing::debug;

/// TLS setup errors
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("certificate material not found: {}", path.display())]
    MissingMaterial { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates in {}", path.display())]
    NoCertificates { path: PathBuf },

    #[error("no private key in {}", path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

impl TlsError {
    /// True when the files are simply absent rather than broken
    pub fn is_missing(&self) -> bool {
        matches!(self, TlsError::MissingMaterial { .. })
    }
}

/// Build the rustls server configuration from PEM files
pub fn load_tls_config(cert: &Path, key: &Path) -> Result<Arc<ServerConfig>, TlsError> {
    for path in [cert, key] {
        if !path.is_file() {
            return Err(TlsError::MissingMaterial {
                path: path.to_path_buf(),
            });
        }
    }

    let chain = load_certs(cert)?;
    let key = load_private_key(key)?;
    debug!("loaded {} certificate(s) from {}", chain.len(), cert.display());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}
