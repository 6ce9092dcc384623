//! Request logging that never writes hidden file names
//!
//! Both the rendered line and the percent-decoded request target are
//! checked, so `/%73erver.key` is suppressed just like `/server.key`.

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::{Method, StatusCode};
use overlay_core::path::decode_request_path;
use overlay_core::AccessPolicy;
use tracing::{debug, info, warn};

/// Access and diagnostic logging filtered by the hidden-file set
#[derive(Clone, Debug)]
pub struct AccessLog {
    policy: Arc<AccessPolicy>,
}

impl AccessLog {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }

    /// Render the access line for a request, or `None` if it must not be logged
    pub fn line(
        &self,
        peer: SocketAddr,
        method: &Method,
        target: &str,
        status: StatusCode,
    ) -> Option<String> {
        let line = format!("{} \"{} {}\" {}", peer, method, target, status.as_u16());

        let decoded_leaks = decode_request_path(target)
            .map(|decoded| self.policy.mentions_hidden(&decoded))
            .unwrap_or(false);

        if decoded_leaks || self.policy.mentions_hidden(&line) {
            None
        } else {
            Some(line)
        }
    }

    /// Log one served request
    pub fn request(&self, peer: SocketAddr, method: &Method, target: &str, status: StatusCode) {
        if let Some(line) = self.line(peer, method, target, status) {
            info!(target: "access", "{}", line);
        }
    }

    /// Internal detail at debug level, subject to the same filter
    pub fn debug(&self, message: &str) {
        if !self.policy.mentions_hidden(message) {
            debug!("{}", message);
        }
    }

    /// Internal problem worth an operator's attention, subject to the same filter
    pub fn warn(&self, message: &str) {
        if !self.policy.mentions_hidden(message) {
            warn!("{}", message);
        }
    }
}
