use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Self-deleting read handle over a locally staged download.
///
/// The blob exclusively owns its backing file. The file is opened lazily on
/// the first read. [`StreamingBlob::close`] closes the handle, deletes the file
/// and leaves the blob inert; further closes are no-ops. Dropping an unclosed
/// blob performs the same release.
#[derive(Debug)]
pub struct StreamingBlob {
    path: PathBuf,
    file: Option<File>,
    released: bool,
}

impl StreamingBlob {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            released: false,
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.released
    }

    /// Close the handle and delete the backing file. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // The handle must be gone before the delete on platforms that lock open files.
        drop(self.file.take());

        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Released staged file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Read for StreamingBlob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.released {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "streaming blob is already closed",
            ));
        }

        let file = match self.file.take() {
            Some(file) => file,
            None => File::open(&self.path)?,
        };

        self.file.insert(file).read(buf)
    }
}

impl Drop for StreamingBlob {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(
                "Failed to remove staged file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
