//! Error types for path resolution and directory listing

use std::io;

use thiserror::Error;

/// Reasons a request path is refused.
///
/// Every variant is reported to clients as the same not-found response;
/// the distinction only exists for internal logging and tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("path is not valid percent-encoded UTF-8")]
    Undecodable,

    #[error("path contains null byte")]
    NullByte,

    #[error("path too long: {size} bytes (max {max})")]
    TooLong { size: usize, max: usize },

    #[error("path escapes the content root")]
    Escapes,

    #[error("hidden file")]
    Hidden,

    #[error("file extension not allowed")]
    DisallowedExtension,

    #[error("symlink escapes the content root")]
    SymlinkEscape,
}

/// Directory enumeration failures
#[derive(Error, Debug)]
pub enum ListingError {
    /// The message is deliberately generic; the cause is kept for logs only.
    #[error("No permission to list directory")]
    Unreadable(#[source] io::Error),
}

impl ListingError {
    /// Underlying I/O error, for internal diagnostics
    pub fn cause(&self) -> &io::Error {
        match self {
            ListingError::Unreadable(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_error_hides_cause() {
        let err = ListingError::Unreadable(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "/srv/public/secret: permission denied",
        ));
        assert_eq!(err.to_string(), "No permission to list directory");
        assert_eq!(err.cause().kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_access_error_messages() {
        let err = AccessError::TooLong { size: 5000, max: 4096 };
        assert_eq!(err.to_string(), "path too long: 5000 bytes (max 4096)");
        assert_eq!(AccessError::Hidden.to_string(), "hidden file");
    }
}
