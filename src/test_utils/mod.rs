//! Test utilities shared by the unit tests.

#![cfg(test)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use crate::models::{Destination, ParsedDestination, RemoteFile};
use crate::staging::StagingArea;

/// Resolve `url` with no explicit credentials.
pub fn parsed(url: &str) -> Arc<ParsedDestination> {
    Arc::new(
        Destination::new(url)
            .resolve()
            .unwrap_or_else(|e| panic!("test URL {} did not resolve: {}", url, e)),
    )
}

/// Descriptor for the file `url` points at.
pub fn remote_file(url: &str) -> RemoteFile {
    RemoteFile::from_destination(&Destination::new(url))
        .unwrap_or_else(|e| panic!("test URL {} did not resolve: {}", url, e))
}

/// Staging area in a fresh temporary directory. Keep the `TempDir` alive for
/// the duration of the test.
pub fn temp_staging() -> (TempDir, StagingArea) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let staging = StagingArea::new(dir.path());
    (dir, staging)
}

/// Number of files currently staged in `dir`.
pub fn staged_file_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
