//! SFTP adapter over libssh2.
//!
//! The destination timeout bounds the TCP connect, and then the SSH handshake
//! and authentication as a single session deadline. The deadline is cleared
//! once the session is authenticated so long transfers are not cut off.

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use ssh2::{ErrorCode, FileStat, Session, Sftp};

use crate::adapters::sftp_auth::{auth_methods, authenticate};
use crate::adapters::{timestamp_from_unix, without_dot_entries, RemoteAdapter, RemoteEntry};
use crate::constants::{
    ERROR_FAILED_TO_CONNECT, ERROR_FAILED_TO_CREATE_SESSION, ERROR_FAILED_TO_CREATE_SFTP,
    SFTP_DEFAULT_PORT,
};
use crate::error::{EntryKind, Error, Result};
use crate::models::{split_remote_path, ParsedDestination, RemoteFile, RemoteFileContent};
use crate::staging::StagingArea;

const PROTOCOL: &str = "sftp";

/// `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

/// An authenticated SFTP subsystem.
#[cfg_attr(test, automock)]
pub trait SftpSession {
    fn read_dir(&mut self, dir: &str) -> Result<Vec<RemoteEntry>>;

    fn stat(&mut self, path: &str) -> Result<RemoteEntry>;

    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64>;

    fn remove_file(&mut self, path: &str) -> Result<()>;

    fn remove_dir(&mut self, path: &str) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

#[cfg_attr(test, automock)]
pub trait SftpConnector: Send + Sync {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn SftpSession>>;
}

/// [`SftpConnector`] backed by the `ssh2` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ssh2Connector;

impl Ssh2Connector {
    /// Create an authenticated SSH session.
    fn create_session(&self, destination: &ParsedDestination) -> Result<Session> {
        let address = destination.address(SFTP_DEFAULT_PORT);
        let timeout = destination.timeout();
        let connect_error = |e: io::Error| {
            Error::transport(format!("{} to {}", ERROR_FAILED_TO_CONNECT, address), e)
        };

        let socket = address
            .to_socket_addrs()
            .map_err(connect_error)?
            .next()
            .ok_or_else(|| {
                connect_error(io::Error::new(io::ErrorKind::NotFound, "address did not resolve"))
            })?;

        let tcp = TcpStream::connect_timeout(&socket, timeout).map_err(connect_error)?;

        let mut session = Session::new()
            .map_err(|e| Error::transport(ERROR_FAILED_TO_CREATE_SESSION, e))?;
        session.set_tcp_stream(tcp);

        session.set_timeout(timeout_millis(timeout));
        session
            .handshake()
            .map_err(|e| Error::transport(format!("SSH handshake with {} failed", address), e))?;

        debug!("Host key of {} is not verified", address);

        authenticate(
            &session,
            destination.user(),
            &auth_methods(destination.credentials()),
            &address,
        )?;

        session.set_timeout(0);
        Ok(session)
    }
}

impl SftpConnector for Ssh2Connector {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn SftpSession>> {
        let session = self.create_session(destination)?;
        let sftp = session
            .sftp()
            .map_err(|e| Error::transport(ERROR_FAILED_TO_CREATE_SFTP, e))?;

        Ok(Box::new(Ssh2SftpSession { session, sftp }))
    }
}

/// libssh2 treats 0 as "no timeout"; anything shorter than a millisecond is
/// rounded up so it still acts as a deadline.
fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1)
}

struct Ssh2SftpSession {
    session: Session,
    sftp: Sftp,
}

impl SftpSession for Ssh2SftpSession {
    fn read_dir(&mut self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let listing = self
            .sftp
            .readdir(Path::new(dir))
            .map_err(|e| sftp_error(dir, "list", e))?;

        Ok(listing
            .into_iter()
            .map(|(path, stat)| entry_from_stat(&path.to_string_lossy(), &stat))
            .collect())
    }

    fn stat(&mut self, path: &str) -> Result<RemoteEntry> {
        let stat = self
            .sftp
            .stat(Path::new(path))
            .map_err(|e| sftp_error(path, "stat", e))?;
        Ok(entry_from_stat(path, &stat))
    }

    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64> {
        let mut file = self
            .sftp
            .open(Path::new(path))
            .map_err(|e| sftp_error(path, "open", e))?;

        io::copy(&mut file, sink)
            .map_err(|e| Error::transport(format!("Failed to read {}", path), e))
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        self.sftp
            .unlink(Path::new(path))
            .map_err(|e| sftp_error(path, "delete", e))
    }

    fn remove_dir(&mut self, path: &str) -> Result<()> {
        self.sftp
            .rmdir(Path::new(path))
            .map_err(|e| sftp_error(path, "remove directory", e))
    }

    fn close(&mut self) -> Result<()> {
        self.session
            .disconnect(None, "closing", None)
            .map_err(|e| Error::transport("Failed to close SSH session", e))
    }
}

fn entry_from_stat(path: &str, stat: &FileStat) -> RemoteEntry {
    let (_, name) = split_remote_path(path);
    RemoteEntry {
        name,
        size: stat.size.unwrap_or(0),
        last_modified: stat.mtime.and_then(timestamp_from_unix),
        is_dir: stat.is_dir(),
    }
}

fn sftp_error(path: &str, action: &str, err: ssh2::Error) -> Error {
    match err.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => Error::NotFound(path.to_string()),
        _ => Error::transport(format!("Failed to {} {}", action, path), err),
    }
}

pub struct SftpAdapter {
    connector: Arc<dyn SftpConnector>,
    staging: StagingArea,
}

impl SftpAdapter {
    pub fn new(staging: StagingArea) -> Self {
        Self::with_connector(Arc::new(Ssh2Connector), staging)
    }

    pub fn with_connector(connector: Arc<dyn SftpConnector>, staging: StagingArea) -> Self {
        Self { connector, staging }
    }

    fn with_session<T, F>(&self, destination: &ParsedDestination, op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn SftpSession) -> Result<T>,
    {
        let mut session = self.connector.connect(destination)?;
        let result = op(session.as_mut());

        if let Err(e) = session.close() {
            debug!("Ignoring error while closing SFTP session: {}", e);
        }

        result
    }
}

impl RemoteAdapter for SftpAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn stat(&self, destination: Arc<ParsedDestination>) -> Result<RemoteFile> {
        let path = destination.path();
        let entry = self.with_session(&destination, |session| session.stat(&path))?;

        if entry.is_dir {
            return Err(Error::wrong_kind(path, EntryKind::File));
        }

        let (dir, _) = split_remote_path(&path);
        Ok(entry.into_remote_file(&dir, &destination))
    }

    /// Files only: subdirectories are left out of the result.
    fn browse(&self, destination: Arc<ParsedDestination>) -> Result<Vec<RemoteFile>> {
        let dir = destination.path();
        let entries = self.with_session(&destination, |session| session.read_dir(&dir))?;

        Ok(without_dot_entries(entries)
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.into_remote_file(&dir, &destination))
            .collect())
    }

    fn download(&self, remote_file: &RemoteFile) -> Result<RemoteFileContent> {
        let path = remote_file.full_path();

        let content = self.with_session(&remote_file.destination, |session| {
            self.staging
                .stage(&remote_file.name, |sink| session.retrieve(&path, sink))
        })?;

        info!("Downloaded {} to {}", path, content.path.display());
        Ok(content)
    }

    fn remove(&self, remote_file: &RemoteFile) -> Result<()> {
        let path = remote_file.full_path();

        self.with_session(&remote_file.destination, |session| {
            if session.stat(&path)?.is_dir {
                session.remove_dir(&path)
            } else {
                session.remove_file(&path)
            }
        })?;

        info!("Removed {}", path);
        Ok(())
    }
}
