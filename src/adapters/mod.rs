//! Protocol adapters.
//!
//! Every protocol family implements the same four operations through
//! [`RemoteAdapter`]. What the operations mean differs per protocol:
//!
//! | adapter | stat | browse | download | remove |
//! |---|---|---|---|---|
//! | [`http::HttpAdapter`] | HEAD + Content-Length | not implemented | GET | not implemented |
//! | [`ftp::FtpAdapter`] | parent listing scan | children incl. directories | RETR | DELE / RMD |
//! | [`sftp::SftpAdapter`] | native stat | files only | open + copy | unlink / rmdir |
//! | [`s3::S3Adapter`] | prefix listing scan | flat key listing | GET (ranged when large) | not implemented |
//!
//! Each adapter reaches its wire client through a small connector/session
//! trait, so the protocol policy above is independent of the client library.

pub mod client;
pub mod ftp;
pub mod http;
pub mod s3;
pub mod sftp;
pub mod sftp_auth;

use std::sync::Arc;

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::error::{EntryKind, Error, Result};
use crate::models::{join_remote_path, ParsedDestination, RemoteFile, RemoteFileContent};

/// Stat/Browse/Download/Remove for one protocol family.
///
/// Adapters hold no per-call state: every call opens its own connection and
/// closes it before returning.
#[cfg_attr(test, automock)]
pub trait RemoteAdapter: Send + Sync {
    /// Short protocol family name used in logs and errors.
    fn protocol(&self) -> &'static str;

    /// Describe the file the destination points at.
    fn stat(&self, destination: Arc<ParsedDestination>) -> Result<RemoteFile>;

    /// List the entries of the destination, in listing order.
    fn browse(&self, destination: Arc<ParsedDestination>) -> Result<Vec<RemoteFile>>;

    /// Stage the file's bytes locally.
    fn download(&self, remote_file: &RemoteFile) -> Result<RemoteFileContent>;

    fn remove(&self, remote_file: &RemoteFile) -> Result<()>;
}

/// One entry of a remote listing, as reported by a wire client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: None,
            is_dir: false,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            last_modified: None,
            is_dir: true,
        }
    }

    pub fn into_remote_file(self, dir: &str, destination: &Arc<ParsedDestination>) -> RemoteFile {
        RemoteFile {
            name: self.name,
            path: dir.to_string(),
            size: self.size,
            last_modified: self.last_modified,
            is_dir: self.is_dir,
            destination: Arc::clone(destination),
        }
    }

    fn is_dot_entry(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Linear scan of a directory listing for `name`. A directory match is a
/// wrong-kind error.
pub(crate) fn find_file(
    entries: Vec<RemoteEntry>,
    dir: &str,
    name: &str,
    destination: &Arc<ParsedDestination>,
) -> Result<RemoteFile> {
    let full_path = join_remote_path(dir, name);

    let entry = entries
        .into_iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| Error::NotFound(full_path.clone()))?;

    if entry.is_dir {
        return Err(Error::wrong_kind(full_path, EntryKind::File));
    }

    Ok(entry.into_remote_file(dir, destination))
}

/// Drop `.` and `..` from a listing.
pub(crate) fn without_dot_entries(entries: Vec<RemoteEntry>) -> Vec<RemoteEntry> {
    entries.into_iter().filter(|e| !e.is_dot_entry()).collect()
}

pub(crate) fn timestamp_from_unix(secs: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Destination;

    fn destination() -> Arc<ParsedDestination> {
        Arc::new(Destination::new("ftp://example.com/pub/a.txt").resolve().unwrap())
    }

    #[test]
    fn test_find_file_match() {
        let entries = vec![RemoteEntry::file("b.txt", 2), RemoteEntry::file("a.txt", 1)];
        let file = find_file(entries, "/pub/", "a.txt", &destination()).unwrap();
        assert_eq!(file.name, "a.txt");
        assert_eq!(file.path, "/pub/");
        assert_eq!(file.size, 1);
    }

    #[test]
    fn test_find_file_missing() {
        let err = find_file(vec![RemoteEntry::file("b.txt", 2)], "/pub/", "a.txt", &destination())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(ref p) if p == "/pub/a.txt"));
    }

    #[test]
    fn test_find_file_directory_is_wrong_kind() {
        let err = find_file(vec![RemoteEntry::directory("a.txt")], "/pub/", "a.txt", &destination())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WrongKind {
                expected: EntryKind::File,
                ..
            }
        ));
    }

    #[test]
    fn test_without_dot_entries() {
        let entries = vec![
            RemoteEntry::directory("."),
            RemoteEntry::directory(".."),
            RemoteEntry::file("x", 1),
        ];
        let kept = without_dot_entries(entries);
        assert_eq!(kept, vec![RemoteEntry::file("x", 1)]);
    }

    #[test]
    fn test_timestamp_from_unix() {
        let ts = timestamp_from_unix(1_554_148_800).unwrap();
        assert_eq!(ts.to_rfc3339(), "2019-04-01T20:00:00+00:00");
    }
}
