//! Scheme-keyed adapter table and the four top-level operations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};

use crate::adapters::ftp::FtpAdapter;
use crate::adapters::http::HttpAdapter;
use crate::adapters::s3::{RusotoConnector, S3Adapter};
use crate::adapters::sftp::SftpAdapter;
use crate::adapters::RemoteAdapter;
use crate::config::AdapterConfig;
use crate::constants::{SCHEME_FTP, SCHEME_FTPS, SCHEME_HTTP, SCHEME_HTTPS, SCHEME_S3, SCHEME_SFTP};
use crate::error::{Error, Result};
use crate::models::{Destination, ParsedDestination, RemoteFile, RemoteFileContent};
use crate::staging::StagingArea;

/// Routes each request to the adapter registered for its scheme.
///
/// Keys are lowercase. Registration replaces any previous adapter for the
/// same scheme and may happen while other threads dispatch.
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn RemoteAdapter>>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// Registry with the built-in adapters, staging in the system temp directory.
    pub fn new() -> Self {
        Self::with_defaults(StagingArea::default(), RusotoConnector::default())
    }

    /// Registry with no adapters at all.
    pub fn empty() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        let staging = config
            .staging_dir
            .as_ref()
            .map(StagingArea::new)
            .unwrap_or_default();

        let object_storage = RusotoConnector::new(
            config.object_storage.region.clone(),
            config.object_storage.endpoint_scheme.clone(),
        );

        Self::with_defaults(staging, object_storage)
    }

    /// http and https share one adapter instance, as do ftp and ftps.
    fn with_defaults(staging: StagingArea, object_storage: RusotoConnector) -> Self {
        let registry = Self::empty();

        let http: Arc<dyn RemoteAdapter> = Arc::new(HttpAdapter::new(staging.clone()));
        registry.register(Arc::clone(&http), SCHEME_HTTP);
        registry.register(http, SCHEME_HTTPS);

        let ftp: Arc<dyn RemoteAdapter> = Arc::new(FtpAdapter::new(staging.clone()));
        registry.register(Arc::clone(&ftp), SCHEME_FTP);
        registry.register(ftp, SCHEME_FTPS);

        registry.register(Arc::new(SftpAdapter::new(staging.clone())), SCHEME_SFTP);
        registry.register(
            Arc::new(S3Adapter::with_connector(Arc::new(object_storage), staging)),
            SCHEME_S3,
        );

        registry
    }

    /// Register `adapter` for `scheme`; the last registration wins.
    pub fn register(&self, adapter: Arc<dyn RemoteAdapter>, scheme: &str) {
        let scheme = scheme.to_ascii_lowercase();
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);

        if adapters.insert(scheme.clone(), adapter).is_some() {
            warn!("Replacing adapter registered for scheme '{}'", scheme);
        } else {
            debug!("Registered adapter for scheme '{}'", scheme);
        }
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);
        let mut schemes: Vec<_> = adapters.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Adapter for the destination's protocol override, or its URL scheme
    /// when no override is given.
    pub fn resolve_adapter(&self, destination: &ParsedDestination) -> Result<Arc<dyn RemoteAdapter>> {
        let scheme = destination.dispatch_scheme();
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);

        adapters
            .get(&scheme)
            .cloned()
            .ok_or_else(|| Error::UnknownScheme {
                scheme,
                url: destination.url().to_string(),
            })
    }

    pub fn stat(&self, destination: &Destination) -> Result<RemoteFile> {
        let parsed = Arc::new(destination.resolve()?);
        let adapter = self.resolve_adapter(&parsed)?;
        debug!("stat {} via {}", parsed.url(), adapter.protocol());
        adapter.stat(parsed)
    }

    pub fn browse(&self, destination: &Destination) -> Result<Vec<RemoteFile>> {
        let parsed = Arc::new(destination.resolve()?);
        let adapter = self.resolve_adapter(&parsed)?;
        debug!("browse {} via {}", parsed.url(), adapter.protocol());
        adapter.browse(parsed)
    }

    /// Download through the destination already attached to `remote_file`.
    pub fn download(&self, remote_file: &RemoteFile) -> Result<RemoteFileContent> {
        let adapter = self.resolve_adapter(&remote_file.destination)?;
        debug!("download {} via {}", remote_file.full_path(), adapter.protocol());
        adapter.download(remote_file)
    }

    pub fn remove(&self, remote_file: &RemoteFile) -> Result<()> {
        let adapter = self.resolve_adapter(&remote_file.destination)?;
        debug!("remove {} via {}", remote_file.full_path(), adapter.protocol());
        adapter.remove(remote_file)
    }
}
