//! FTP and FTPS adapter.
//!
//! TLS is used when the destination's scheme is `ftps` or its credentials
//! carry TLS settings. Explicit mode connects in plain text and upgrades with
//! `AUTH TLS`; implicit mode connects straight into TLS on port 990 unless the
//! URL names another port. Data connections are always passive.
//!
//! The destination timeout bounds the TCP connect and every control-channel
//! exchange up to a completed login.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use native_tls::{Certificate, Identity, TlsConnector};
use suppaftp::list::File as ListLine;
use suppaftp::{FtpError, Mode, NativeTlsConnector, NativeTlsFtpStream};

use crate::adapters::{find_file, without_dot_entries, RemoteAdapter, RemoteEntry};
use crate::constants::{
    ERROR_AUTHENTICATION_FAILED, ERROR_FAILED_TO_CONNECT, FTPS_IMPLICIT_DEFAULT_PORT,
    FTP_DEFAULT_PORT, SCHEME_FTPS,
};
use crate::error::{EntryKind, Error, Result};
use crate::models::{
    split_remote_path, ClientIdentity, ParsedDestination, RemoteFile, RemoteFileContent, TlsMode,
    TlsSettings,
};
use crate::staging::StagingArea;

const PROTOCOL: &str = "ftp";
const ANONYMOUS_USER: &str = "anonymous";

/// One logged-in control connection.
#[cfg_attr(test, automock)]
pub trait FtpSession {
    /// Entries of `dir` as reported by the server, `.` and `..` included.
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>>;

    /// Copy `path` into `sink`, returning the byte count.
    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64>;

    fn remove_file(&mut self, path: &str) -> Result<()>;

    fn remove_dir(&mut self, path: &str) -> Result<()>;

    fn quit(&mut self) -> Result<()>;
}

#[cfg_attr(test, automock)]
pub trait FtpConnector: Send + Sync {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn FtpSession>>;
}

/// How the control connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpSecurity {
    Plain,
    Explicit,
    Implicit,
}

impl FtpSecurity {
    pub fn for_destination(destination: &ParsedDestination) -> Self {
        let credentials = destination.credentials();
        let wants_tls = destination.scheme() == SCHEME_FTPS
            || destination.dispatch_scheme() == SCHEME_FTPS
            || credentials.tls.is_some();

        match (wants_tls, credentials.tls_mode) {
            (false, _) => FtpSecurity::Plain,
            (true, TlsMode::Explicit) => FtpSecurity::Explicit,
            (true, TlsMode::Implicit) => FtpSecurity::Implicit,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            FtpSecurity::Implicit => FTPS_IMPLICIT_DEFAULT_PORT,
            _ => FTP_DEFAULT_PORT,
        }
    }
}

/// [`FtpConnector`] backed by suppaftp over native-tls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuppaFtpConnector;

impl FtpConnector for SuppaFtpConnector {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn FtpSession>> {
        let security = FtpSecurity::for_destination(destination);
        let address = destination.address(security.default_port());
        let host = destination.host();
        let timeout = destination.timeout();
        let connect_error = |e: FtpError| {
            Error::transport(format!("{} to {}", ERROR_FAILED_TO_CONNECT, address), e)
        };

        let socket = resolve_address(&address)?;
        debug!("Connecting to {} ({:?})", address, security);

        let mut stream = match security {
            FtpSecurity::Implicit => connect_implicit(
                socket,
                tls_connector(destination.credentials().tls.as_ref())?,
                host,
                timeout,
            )
            .map_err(connect_error)?,
            FtpSecurity::Explicit => dial(socket, timeout)
                .and_then(NativeTlsFtpStream::connect_with_stream)
                .map_err(connect_error)?
                .into_secure(tls_connector(destination.credentials().tls.as_ref())?, host)
                .map_err(connect_error)?,
            FtpSecurity::Plain => dial(socket, timeout)
                .and_then(NativeTlsFtpStream::connect_with_stream)
                .map_err(connect_error)?,
        };

        let (user, password) = login_pair(destination);
        stream.login(user, password).map_err(|e| {
            Error::authentication(address.clone(), format!("{}: {}", ERROR_AUTHENTICATION_FAILED, e))
        })?;
        stream.set_mode(Mode::Passive);

        // The deadline covers session setup only; transfers run unbounded.
        set_deadline(stream.get_ref(), None).map_err(connect_error)?;

        Ok(Box::new(SuppaFtpSession { stream }))
    }
}

/// TCP connect bounded by `timeout`, with the same read and write deadline
/// left on the socket for the banner, `AUTH TLS` and login.
fn dial(socket: SocketAddr, timeout: Duration) -> std::result::Result<TcpStream, FtpError> {
    let tcp = TcpStream::connect_timeout(&socket, timeout).map_err(FtpError::ConnectionError)?;
    set_deadline(&tcp, Some(timeout))?;
    Ok(tcp)
}

fn set_deadline(tcp: &TcpStream, timeout: Option<Duration>) -> std::result::Result<(), FtpError> {
    tcp.set_read_timeout(timeout)
        .and_then(|_| tcp.set_write_timeout(timeout))
        .map_err(FtpError::ConnectionError)
}

/// Implicit TLS dials its own socket, so session setup runs on a helper
/// thread that is abandoned once `timeout` expires.
fn connect_implicit(
    socket: SocketAddr,
    tls: NativeTlsConnector,
    host: &str,
    timeout: Duration,
) -> std::result::Result<NativeTlsFtpStream, FtpError> {
    let (tx, rx) = mpsc::channel();
    let domain = host.to_string();

    thread::spawn(move || {
        let _ = tx.send(NativeTlsFtpStream::connect_secure_implicit(socket, tls, &domain));
    });

    let stream = match rx.recv_timeout(timeout) {
        Ok(result) => result?,
        Err(RecvTimeoutError::Timeout) => {
            return Err(FtpError::ConnectionError(io::Error::new(
                io::ErrorKind::TimedOut,
                "implicit TLS connection timed out",
            )))
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(FtpError::ConnectionError(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "implicit TLS connection attempt aborted",
            )))
        }
    };

    set_deadline(stream.get_ref(), Some(timeout))?;
    Ok(stream)
}

fn resolve_address(address: &str) -> Result<SocketAddr> {
    let context = || format!("{} to {}", ERROR_FAILED_TO_CONNECT, address);
    address
        .to_socket_addrs()
        .map_err(|e| Error::transport(context(), e))?
        .next()
        .ok_or_else(|| {
            Error::transport(
                context(),
                io::Error::new(io::ErrorKind::NotFound, "address did not resolve"),
            )
        })
}

/// An empty user logs in anonymously.
fn login_pair(destination: &ParsedDestination) -> (&str, &str) {
    match destination.user() {
        "" => (ANONYMOUS_USER, destination.password().unwrap_or(ANONYMOUS_USER)),
        user => (user, destination.password().unwrap_or_default()),
    }
}

fn tls_connector(settings: Option<&TlsSettings>) -> Result<NativeTlsConnector> {
    let tls_error = |e: native_tls::Error| Error::transport("Invalid TLS configuration", e);
    let mut builder = TlsConnector::builder();

    if let Some(settings) = settings {
        if let Some(identity) = &settings.identity {
            let identity = match identity {
                ClientIdentity::Pkcs12 { der, password } => {
                    Identity::from_pkcs12(der, password).map_err(tls_error)?
                }
                ClientIdentity::Pem {
                    certificate,
                    private_key,
                } => Identity::from_pkcs8(certificate, private_key).map_err(tls_error)?,
            };
            builder.identity(identity);
        }
        if let Some(pem) = &settings.root_certificate_pem {
            builder.add_root_certificate(Certificate::from_pem(pem).map_err(tls_error)?);
        }
        builder.danger_accept_invalid_certs(settings.accept_invalid_certs);
    }

    Ok(NativeTlsConnector::from(builder.build().map_err(tls_error)?))
}

struct SuppaFtpSession {
    stream: NativeTlsFtpStream,
}

impl FtpSession for SuppaFtpSession {
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let target = if dir.is_empty() { None } else { Some(dir) };
        let lines = self
            .stream
            .list(target)
            .map_err(|e| ftp_error(format!("Failed to list {}", dir), e))?;

        Ok(lines.iter().filter_map(|line| parse_list_line(line)).collect())
    }

    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64> {
        self.stream
            .retr(path, |reader| {
                io::copy(reader, &mut *sink).map_err(FtpError::ConnectionError)
            })
            .map_err(|e| ftp_error(format!("Failed to retrieve {}", path), e))
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        self.stream
            .rm(path)
            .map_err(|e| ftp_error(format!("Failed to delete {}", path), e))
    }

    fn remove_dir(&mut self, path: &str) -> Result<()> {
        self.stream
            .rmdir(path)
            .map_err(|e| ftp_error(format!("Failed to remove directory {}", path), e))
    }

    fn quit(&mut self) -> Result<()> {
        self.stream
            .quit()
            .map_err(|e| ftp_error("Failed to close FTP session".to_string(), e))
    }
}

fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    match line.parse::<ListLine>() {
        Ok(file) => Some(RemoteEntry {
            name: file.name().to_string(),
            size: file.size() as u64,
            last_modified: Some(DateTime::<Utc>::from(file.modified())),
            is_dir: file.is_directory(),
        }),
        Err(_) => {
            debug!("Skipping unparseable listing line: {}", line);
            None
        }
    }
}

fn ftp_error(context: String, err: FtpError) -> Error {
    match err {
        FtpError::UnexpectedResponse(response) => Error::ProtocolStatus {
            status: response.status.code().to_string(),
            message: format!(
                "{}: {}",
                context,
                String::from_utf8_lossy(&response.body).trim()
            ),
        },
        other => Error::transport(context, other),
    }
}

pub struct FtpAdapter {
    connector: Arc<dyn FtpConnector>,
    staging: StagingArea,
}

impl FtpAdapter {
    pub fn new(staging: StagingArea) -> Self {
        Self::with_connector(Arc::new(SuppaFtpConnector), staging)
    }

    pub fn with_connector(connector: Arc<dyn FtpConnector>, staging: StagingArea) -> Self {
        Self { connector, staging }
    }

    /// Run `op` on a fresh session, quitting it afterwards whatever the outcome.
    fn with_session<T, F>(&self, destination: &ParsedDestination, op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn FtpSession) -> Result<T>,
    {
        let mut session = self.connector.connect(destination)?;
        let result = op(session.as_mut());

        if let Err(e) = session.quit() {
            debug!("Ignoring error while closing FTP session: {}", e);
        }

        result
    }
}

/// Find `path` in its parent's listing.
fn lookup(session: &mut dyn FtpSession, path: &str) -> Result<RemoteEntry> {
    let (dir, name) = split_remote_path(path);
    if name.is_empty() {
        return Err(Error::wrong_kind(path, EntryKind::File));
    }

    session
        .list(&dir)?
        .into_iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| Error::NotFound(path.to_string()))
}

impl RemoteAdapter for FtpAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn stat(&self, destination: Arc<ParsedDestination>) -> Result<RemoteFile> {
        let path = destination.path();
        let (dir, name) = split_remote_path(&path);
        if name.is_empty() {
            return Err(Error::wrong_kind(path, EntryKind::File));
        }

        let entries = self.with_session(&destination, |session| session.list(&dir))?;
        find_file(entries, &dir, &name, &destination)
    }

    fn browse(&self, destination: Arc<ParsedDestination>) -> Result<Vec<RemoteFile>> {
        let dir = destination.path();
        let entries = self.with_session(&destination, |session| session.list(&dir))?;

        Ok(without_dot_entries(entries)
            .into_iter()
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
            if lookup(session, &path)?.is_dir {
                session.remove_dir(&path)
            } else {
                session.remove_file(&path)
            }
        })?;

        info!("Removed {}", path);
        Ok(())
    }
}
