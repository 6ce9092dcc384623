//! Request path resolution and confinement
//!
//! Maps untrusted request targets onto the content root. Every path handed
//! back for ordinary content lies inside the root after lexical
//! normalization; the CA certificate route is the only exception and is
//! matched by exact string equality before any joining happens.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::AccessError;
use crate::policy::{AccessPolicy, EntryKind};
use crate::{CA_ROUTE, MAX_PATH_LEN};

/// What a resolved content path points at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
    /// Nothing exists there; the caller reports not-found
    Missing,
    /// Sockets, FIFOs, devices. Never served.
    Other,
}

impl TargetKind {
    /// Policy classification for kinds that can be exposed
    pub fn entry_kind(self) -> Option<EntryKind> {
        match self {
            TargetKind::File => Some(EntryKind::File),
            TargetKind::Directory => Some(EntryKind::Directory),
            TargetKind::Missing | TargetKind::Other => None,
        }
    }
}

/// A request path that passed the access policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    /// The CA certificate download, outside the content root
    CaCertificate(PathBuf),
    /// A location inside the content root
    Content { path: PathBuf, kind: TargetKind },
}

/// Resolves request paths against a confined content root
#[derive(Clone, Debug)]
pub struct Resolver {
    root: PathBuf,
    /// String form of `root` used for the prefix check
    root_str: String,
    ca_file: PathBuf,
    policy: Arc<AccessPolicy>,
    confine_symlinks: bool,
}

impl Resolver {
    /// Create a resolver for `root`.
    ///
    /// A relative root is anchored at the current directory. The root does
    /// not need to exist yet; missing content simply resolves as `Missing`.
    pub fn new(
        root: impl AsRef<Path>,
        ca_file: impl Into<PathBuf>,
        policy: Arc<AccessPolicy>,
    ) -> io::Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        let root = normalize_lexically(&absolute);
        let root_str = root.to_string_lossy().into_owned();

        Ok(Self {
            root,
            root_str,
            ca_file: ca_file.into(),
            policy,
            confine_symlinks: true,
        })
    }

    /// Enable or disable the real-path check for existing targets
    pub fn with_symlink_confinement(mut self, enabled: bool) -> Self {
        self.confine_symlinks = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ca_file(&self) -> &Path {
        &self.ca_file
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Shared handle to the policy, for components that outlive a borrow
    pub fn shared_policy(&self) -> Arc<AccessPolicy> {
        Arc::clone(&self.policy)
    }

    /// Resolve a raw request target (path plus optional query/fragment).
    pub fn resolve(&self, raw: &str) -> Result<Resolved, AccessError> {
        let decoded = decode_request_path(raw)?;

        // Exact match only: never routed through join/normalize
        if decoded == CA_ROUTE {
            return Ok(Resolved::CaCertificate(self.ca_file.clone()));
        }

        // Every leading separator goes, or the join would replace the root
        let relative = decoded.trim_start_matches('/');
        let joined = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        };
        let path = normalize_lexically(&joined);

        if !self.is_confined(&path) {
            return Err(AccessError::Escapes);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let kind = target_kind(&path);
        match kind.entry_kind() {
            Some(entry) => self.admit(&path, &name, entry)?,
            None if self.policy.is_hidden(&name) => return Err(AccessError::Hidden),
            None => {}
        }

        Ok(Resolved::Content { path, kind })
    }

    /// Decide whether an existing entry inside the root may be exposed.
    ///
    /// This is the one decision behind both serving and listing: the
    /// policy's [`permits`](AccessPolicy::permits), then the real-path check
    /// when symlink confinement is on.
    pub fn admit(&self, path: &Path, name: &str, kind: EntryKind) -> Result<(), AccessError> {
        if !self.policy.permits(name, kind) {
            return Err(if self.policy.is_hidden(name) {
                AccessError::Hidden
            } else {
                AccessError::DisallowedExtension
            });
        }

        if self.confine_symlinks {
            confined_real_path(&self.root, path)?;
        }
        Ok(())
    }

    /// Textual prefix check, applied after normalization
    fn is_confined(&self, path: &Path) -> bool {
        let candidate = path.to_string_lossy();
        match candidate.strip_prefix(self.root_str.as_str()) {
            Some("") => true,
            Some(rest) => {
                rest.starts_with(MAIN_SEPARATOR) || self.root_str.ends_with(MAIN_SEPARATOR)
            }
            None => false,
        }
    }
}

/// Strip query and fragment, then percent-decode.
///
/// Decoding that yields invalid UTF-8 is a rejection, as are NUL bytes and
/// paths longer than [`MAX_PATH_LEN`].
pub fn decode_request_path(raw: &str) -> Result<String, AccessError> {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let decoded = percent_decode_str(&raw[..end])
        .decode_utf8()
        .map_err(|_| AccessError::Undecodable)?;

    if decoded.contains('\0') {
        return Err(AccessError::NullByte);
    }

    if decoded.len() > MAX_PATH_LEN {
        return Err(AccessError::TooLong {
            size: decoded.len(),
            max: MAX_PATH_LEN,
        });
    }

    Ok(decoded.into_owned())
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `..` never climbs above the filesystem root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }

    out
}

/// Validate that an existing path stays within `base` once symlinks are
/// followed.
pub fn confined_real_path(base: &Path, path: &Path) -> Result<PathBuf, AccessError> {
    let canonical_base = base.canonicalize().map_err(|e| {
        debug!("cannot canonicalize content root: {}", e);
        AccessError::SymlinkEscape
    })?;

    let canonical_path = path.canonicalize().map_err(|e| {
        debug!("cannot canonicalize target: {}", e);
        AccessError::SymlinkEscape
    })?;

    if !canonical_path.starts_with(&canonical_base) {
        return Err(AccessError::SymlinkEscape);
    }

    Ok(canonical_path)
}

fn target_kind(path: &Path) -> TargetKind {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => TargetKind::File,
        Ok(meta) if meta.is_dir() => TargetKind::Directory,
        Ok(_) => TargetKind::Other,
        Err(_) => TargetKind::Missing,
    }
}
