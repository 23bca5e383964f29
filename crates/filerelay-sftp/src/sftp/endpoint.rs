// ── Endpoint abstraction ─────────────────────────────────────────────────────
//
// The protocol primitives the transfer engine consumes.  Every call is
// blocking; connectors run the engine on a blocking worker thread.

use crate::sftp::error::TransferResult;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::{Read, Write};

/// Directory entry or stat result.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub is_file: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

pub trait FileEndpoint {
    /// Short label for log lines, e.g. `local` or `sftp://demo@host:22`.
    fn describe(&self) -> String;

    /// Verify the endpoint is usable and re-establish it if not.
    fn ensure_connected(&mut self) -> TransferResult<()>;

    /// Entries of `dir`, without `.` and `..`.
    fn list(&self, dir: &str) -> TransferResult<Vec<EntryInfo>>;

    /// `Ok(None)` when nothing exists at `path`.
    fn stat(&self, path: &str) -> TransferResult<Option<EntryInfo>>;

    fn exists(&self, path: &str) -> TransferResult<bool> {
        Ok(self.stat(path)?.is_some())
    }

    fn create_dir_all(&self, dir: &str) -> TransferResult<()>;

    fn rename(&self, from: &str, to: &str) -> TransferResult<()>;

    fn remove_file(&self, path: &str) -> TransferResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &str) -> TransferResult<()>;

    fn set_modified(&self, path: &str, modified: DateTime<Utc>) -> TransferResult<()>;

    fn open_read(&self, path: &str) -> TransferResult<Box<dyn Read + '_>>;

    /// Open for writing; `append` keeps existing content, otherwise the file
    /// is created or truncated.
    fn open_write(&self, path: &str, append: bool) -> TransferResult<Box<dyn Write + '_>>;

    /// Up to `len` bytes from the end of the file.
    fn read_tail(&self, path: &str, len: u64) -> TransferResult<Vec<u8>>;

    /// Cut the file back to `len` bytes.
    fn truncate(&self, path: &str, len: u64) -> TransferResult<()>;

    fn separator(&self) -> char {
        '/'
    }

    fn join(&self, dir: &str, name: &str) -> String {
        if dir.is_empty() {
            name.to_string()
        } else if dir.ends_with('/') || dir.ends_with('\\') {
            format!("{}{}", dir, name)
        } else {
            format!("{}{}{}", dir, self.separator(), name)
        }
    }
}

/// Split a path on its last `/` or `\` into (directory, name).
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind(['/', '\\']) {
        Some(0) => (&path[..1], &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

pub fn has_separator(path: &str) -> bool {
    path.contains('/') || path.contains('\\')
}

// ── Source / destination tagging ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Destination => write!(f, "destination"),
        }
    }
}

/// An endpoint together with the role it plays in the run.
pub enum EndpointRef<'a> {
    Source(&'a dyn FileEndpoint),
    Destination(&'a dyn FileEndpoint),
}

impl<'a> EndpointRef<'a> {
    pub fn side(&self) -> Side {
        match self {
            EndpointRef::Source(_) => Side::Source,
            EndpointRef::Destination(_) => Side::Destination,
        }
    }

    pub fn endpoint(&self) -> &'a dyn FileEndpoint {
        match self {
            EndpointRef::Source(ep) | EndpointRef::Destination(ep) => *ep,
        }
    }
}

impl fmt::Display for EndpointRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.side(), self.endpoint().describe())
    }
}
