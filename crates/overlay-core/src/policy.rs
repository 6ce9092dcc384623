//! Access policy shared by path resolution and directory listings
//!
//! The same [`AccessPolicy::permits`] decision is used when serving a path
//! and when listing a directory, so a listing never shows an entry that a
//! GET would refuse.

use std::collections::BTreeSet;
use std::path::Path;

/// Basenames that are never served or listed
pub const DEFAULT_HIDDEN_FILES: &[&str] = &[
    "server.key",
    "server.crt",
    "https_server.py",
    ".gitignore",
    ".env",
    "config.ini",
];

/// Extensions regular files must carry to be served
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] =
    &[".html", ".css", ".js", ".json", ".png", ".jpg", ".gif", ".svg"];

/// Filesystem entry classification relevant to the policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Hidden-name set and extension allow-list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPolicy {
    hidden_files: BTreeSet<String>,
    /// Lower-case, without the leading dot
    allowed_extensions: BTreeSet<String>,
}

impl AccessPolicy {
    /// Build a policy from hidden names and extensions.
    ///
    /// Extensions may be given with or without the leading dot and in any case.
    pub fn new<H, E>(hidden_files: H, allowed_extensions: E) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            hidden_files: hidden_files.into_iter().map(Into::into).collect(),
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Exact basename match against the hidden set
    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden_files.contains(name)
    }

    /// Case-insensitive check of the final extension
    pub fn extension_allowed(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.allowed_extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Whether an entry with this basename and kind may be exposed.
    ///
    /// Directories skip the extension check so they stay navigable.
    pub fn permits(&self, name: &str, kind: EntryKind) -> bool {
        if self.is_hidden(name) {
            return false;
        }
        match kind {
            EntryKind::File => self.extension_allowed(name),
            EntryKind::Directory => true,
        }
    }

    /// Whether rendered text mentions any hidden name
    pub fn mentions_hidden(&self, text: &str) -> bool {
        self.hidden_files.iter().any(|name| text.contains(name.as_str()))
    }

    pub fn hidden_files(&self) -> impl Iterator<Item = &str> {
        self.hidden_files.iter().map(String::as_str)
    }

    /// Allowed extensions, dot-prefixed for display
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_extensions
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect()
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_HIDDEN_FILES.iter().copied(),
            DEFAULT_ALLOWED_EXTENSIONS.iter().copied(),
        )
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hidden_files() {
        let policy = AccessPolicy::default();
        for name in DEFAULT_HIDDEN_FILES {
            assert!(policy.is_hidden(name), "{} should be hidden", name);
        }
        assert!(!policy.is_hidden("index.html"));
        // Exact match only
        assert!(!policy.is_hidden("server.key.bak"));
        assert!(!policy.is_hidden("SERVER.KEY"));
    }

    #[test]
    fn test_extension_case_folding() {
        let policy = AccessPolicy::default();
        assert!(policy.extension_allowed("index.html"));
        assert!(policy.extension_allowed("LOGO.PNG"));
        assert!(policy.extension_allowed("app.min.Js"));
        assert!(!policy.extension_allowed("notes.txt"));
        assert!(!policy.extension_allowed("Makefile"));
        assert!(!policy.extension_allowed(".bashrc"));
        assert!(!policy.extension_allowed("archive.html.gz"));
    }

    #[test]
    fn test_extensions_with_or_without_dot() {
        let policy = AccessPolicy::new(Vec::<String>::new(), ["txt", ".MD", " .csv "]);
        assert!(policy.extension_allowed("a.txt"));
        assert!(policy.extension_allowed("README.md"));
        assert!(policy.extension_allowed("data.CSV"));
        assert_eq!(policy.allowed_extensions(), vec![".csv", ".md", ".txt"]);
    }

    #[test]
    fn test_permits_directories_without_extension() {
        let policy = AccessPolicy::default();
        assert!(policy.permits("images", EntryKind::Directory));
        assert!(policy.permits("v1.2", EntryKind::Directory));
        assert!(!policy.permits("images", EntryKind::File));
        // Hidden names are refused whatever their kind
        assert!(!policy.permits(".env", EntryKind::Directory));
        assert!(!policy.permits("config.ini", EntryKind::File));
    }

    #[test]
    fn test_mentions_hidden() {
        let policy = AccessPolicy::default();
        assert!(policy.mentions_hidden("\"GET /server.key HTTP/1.1\" 404"));
        assert!(policy.mentions_hidden("GET /deep/dir/.env"));
        assert!(!policy.mentions_hidden("GET /index.html"));
    }
}
