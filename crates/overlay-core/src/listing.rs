//! Directory listings filtered through the access policy
//!
//! Every entry goes through [`Resolver::admit`], the same decision a GET
//! goes through, so nothing shows up here that serving would refuse.

use std::fs;
use std::path::Path;

use html_escape::{encode_double_quoted_attribute, encode_text};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::debug;

use crate::error::ListingError;
use crate::path::Resolver;
use crate::policy::EntryKind;

/// Characters escaped inside a single path segment of a listing link
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A visible directory entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl ListingEntry {
    /// Name as displayed, with a trailing `/` for directories
    pub fn display_name(&self) -> String {
        match self.kind {
            EntryKind::Directory => format!("{}/", self.name),
            EntryKind::File => self.name.clone(),
        }
    }

    /// Relative link target
    pub fn href(&self) -> String {
        let encoded = utf8_percent_encode(&self.name, SEGMENT).to_string();
        match self.kind {
            EntryKind::Directory => format!("{}/", encoded),
            EntryKind::File => encoded,
        }
    }
}

/// Enumerate `dir`, keeping only entries `resolver` admits, sorted by name.
pub fn list_directory(dir: &Path, resolver: &Resolver) -> Result<Vec<ListingEntry>, ListingError> {
    let entries = fs::read_dir(dir).map_err(ListingError::Unreadable)?;

    let mut visible = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable directory entry: {}", e);
                continue;
            }
        };

        // Names that are not UTF-8 can never be requested
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };

        // Follow symlinks, as the resolver does
        let path = entry.path();
        let kind = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => EntryKind::File,
            Ok(meta) if meta.is_dir() => EntryKind::Directory,
            _ => continue,
        };

        match resolver.admit(&path, &name, kind) {
            Ok(()) => visible.push(ListingEntry { name, kind }),
            Err(reason) => debug!("entry left out of listing: {}", reason),
        }
    }

    visible.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(visible)
}

/// Render the HTML index page for `display_path`.
pub fn render_html(display_path: &str, entries: &[ListingEntry]) -> String {
    let title = format!("Directory listing for {}", encode_text(display_path));

    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );

    for entry in entries {
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            encode_double_quoted_attribute(&entry.href()),
            encode_text(&entry.display_name())
        ));
    }

    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}
