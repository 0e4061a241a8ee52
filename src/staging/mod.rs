//! Local staging of downloaded bytes.
//!
//! Every adapter's download ends the same way: remote bytes are copied into a
//! uniquely named file under the staging directory and handed back as a
//! [`StreamingBlob`]. A failed copy never leaves a partial file behind.

mod blob;

pub use blob::StreamingBlob;

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use uuid::Uuid;

use crate::constants::STAGING_BUFFER_SIZE;
use crate::error::Result;
use crate::models::RemoteFileContent;
use crate::security::sanitize_filename;

/// Directory downloads are staged in. Defaults to the system temp directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    dir: PathBuf,
}

impl Default for StagingArea {
    fn default() -> Self {
        Self {
            dir: env::temp_dir(),
        }
    }
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage a download.
    ///
    /// `fill` receives a buffered writer over a fresh staging file and returns
    /// the number of bytes it wrote. If it fails, the staging file is removed
    /// and the error is returned unchanged.
    pub fn stage<F>(&self, name: &str, fill: F) -> Result<RemoteFileContent>
    where
        F: FnOnce(&mut dyn Write) -> Result<u64>,
    {
        let (path, file) = self.create_file(name)?;

        // Owns the file from here on; dropping it on an error path deletes it.
        let blob = StreamingBlob::new(path.clone());

        let mut writer = BufWriter::with_capacity(STAGING_BUFFER_SIZE, file);
        let bytes = fill(&mut writer)?;
        writer.flush()?;
        drop(writer);

        debug!("Staged {} bytes of {} at {}", bytes, name, path.display());

        Ok(RemoteFileContent {
            name: name.to_string(),
            path,
            blob,
        })
    }

    fn create_file(&self, name: &str) -> Result<(PathBuf, File)> {
        fs::create_dir_all(&self.dir)?;

        let file_name = format!("{}.{}", sanitize_filename(name), Uuid::new_v4().simple());
        let path = self.dir.join(file_name);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;

        Ok((path, file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::{self, Read};
    use tempfile::TempDir;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_stage_round_trip_and_release() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::new(dir.path());

        let mut content = staging
            .stage("report.csv", |sink| {
                sink.write_all(b"a,b,c\n1,2,3\n")?;
                Ok(12)
            })
            .unwrap();

        assert_eq!(content.name, "report.csv");
        assert!(content.path.starts_with(dir.path()));
        assert!(content
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("report.csv."));

        let mut read_back = Vec::new();
        content.blob.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, b"a,b,c\n1,2,3\n");

        content.blob.close().unwrap();
        assert!(!content.path.exists());
        content.blob.close().unwrap();
    }

    #[test]
    fn test_failed_fill_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::new(dir.path());

        let result = staging.stage("broken.bin", |sink| {
            sink.write_all(b"partial")?;
            Err(Error::transport(
                "Failed to retrieve broken.bin",
                io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
            ))
        });

        assert!(matches!(result, Err(Error::Transport { .. })));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_staged_names_are_unique_and_sanitized() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::new(dir.path());

        let first = staging.stage("../../etc/passwd", |_| Ok(0)).unwrap();
        let second = staging.stage("../../etc/passwd", |_| Ok(0)).unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(first.path.parent().unwrap(), dir.path());
        assert_eq!(second.path.parent().unwrap(), dir.path());
        assert_eq!(entries(dir.path()), 2);
    }

    #[test]
    fn test_staging_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let staging = StagingArea::new(&nested);

        let content = staging.stage("x.txt", |_| Ok(0)).unwrap();
        assert!(content.path.starts_with(&nested));
    }
}
