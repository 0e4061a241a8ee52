//! S3-compatible object storage adapter.
//!
//! The destination host is the endpoint and the first path segment is the
//! bucket; everything after it is the object key (or listing prefix). The
//! access key travels as the user and the secret key as the password.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use rusoto_core::RusotoError;
use rusoto_s3::{
    GetObjectError, GetObjectRequest, HeadObjectRequest, ListObjectsRequest, S3Client, S3,
};
use tokio::io::AsyncReadExt;
use tokio::runtime::Runtime;

use crate::adapters::client::create_s3_client;
use crate::adapters::{RemoteAdapter, RemoteEntry};
use crate::constants::{
    LARGE_OBJECT_THRESHOLD, S3_DEFAULT_ENDPOINT_SCHEME, S3_DEFAULT_REGION,
    S3_DOWNLOAD_CHUNK_SIZE, S3_MAX_CONCURRENT_PARTS, STAGING_BUFFER_SIZE,
};
use crate::error::{EntryKind, Error, Result};
use crate::models::{ParsedDestination, RemoteFile, RemoteFileContent};
use crate::staging::StagingArea;

const PROTOCOL: &str = "s3";

/// Object operations against one endpoint.
#[cfg_attr(test, automock)]
pub trait ObjectStore {
    /// Objects in `bucket` whose keys start with `prefix`, in listing order.
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<RemoteEntry>>;

    /// Copy one object into `sink`, returning the byte count.
    fn download_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> Result<u64>;
}

#[cfg_attr(test, automock)]
pub trait ObjectStoreConnector: Send + Sync {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn ObjectStore>>;
}

/// Inclusive byte range of one ranged GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    fn header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Split `size` bytes into consecutive ranges of at most `chunk_size`.
pub fn plan_parts(size: u64, chunk_size: u64) -> Vec<ByteRange> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let mut parts = Vec::with_capacity(size.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < size {
        let end = (start + chunk_size).min(size) - 1;
        parts.push(ByteRange { start, end });
        start = end + 1;
    }
    parts
}

/// Split a remote path into bucket and key.
pub fn object_location(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((bucket, key)) => (bucket.to_string(), key.to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

/// [`ObjectStoreConnector`] backed by rusoto.
#[derive(Debug, Clone)]
pub struct RusotoConnector {
    region: String,
    endpoint_scheme: String,
}

impl Default for RusotoConnector {
    fn default() -> Self {
        Self::new(S3_DEFAULT_REGION, S3_DEFAULT_ENDPOINT_SCHEME)
    }
}

impl RusotoConnector {
    pub fn new(region: impl Into<String>, endpoint_scheme: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_scheme: endpoint_scheme.into(),
        }
    }

    /// Endpoint URL for the destination host, keeping an explicit port.
    pub fn endpoint(&self, destination: &ParsedDestination) -> String {
        match destination.parsed_url().port() {
            Some(port) => format!("{}://{}:{}", self.endpoint_scheme, destination.host(), port),
            None => format!("{}://{}", self.endpoint_scheme, destination.host()),
        }
    }
}

impl ObjectStoreConnector for RusotoConnector {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn ObjectStore>> {
        let endpoint = self.endpoint(destination);
        let client = create_s3_client(
            &endpoint,
            Some(&self.region),
            destination.user(),
            destination.password().unwrap_or_default(),
        )?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Box::new(RusotoObjectStore {
            client,
            runtime,
            timeout: destination.timeout(),
        }))
    }
}

struct RusotoObjectStore {
    client: S3Client,
    runtime: Runtime,
    timeout: Duration,
}

impl RusotoObjectStore {
    /// Run one request future to completion under the request timeout.
    fn call<T, E>(
        &self,
        location: &str,
        request: impl Future<Output = std::result::Result<T, RusotoError<E>>>,
    ) -> Result<T>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.runtime
            .block_on(with_timeout(self.timeout, location, request))?
            .map_err(|e| rusoto_error(location, e))
    }

    fn download_whole(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> Result<u64> {
        let location = format!("s3://{}/{}", bucket, key);
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        };

        self.runtime.block_on(async {
            let output = with_timeout(self.timeout, &location, self.client.get_object(request))
                .await?
                .map_err(|e| get_object_error(&location, e))?;

            let body = output.body.ok_or_else(|| Error::NotFound(location.clone()))?;
            let mut reader = body.into_async_read();
            let mut buffer = vec![0u8; STAGING_BUFFER_SIZE];
            let mut written = 0u64;

            loop {
                let read = reader
                    .read(&mut buffer)
                    .await
                    .map_err(|e| Error::transport(format!("Failed to read {}", location), e))?;
                if read == 0 {
                    break;
                }
                sink.write_all(&buffer[..read])?;
                written += read as u64;
            }

            Ok::<u64, Error>(written)
        })
    }

    fn download_ranged(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        let parts = plan_parts(size, S3_DOWNLOAD_CHUNK_SIZE);
        debug!(
            "Fetching s3://{}/{} as {} ranged parts",
            bucket,
            key,
            parts.len()
        );

        self.runtime.block_on(write_parts(
            &parts,
            S3_MAX_CONCURRENT_PARTS,
            |range| self.fetch_part(bucket, key, range),
            sink,
        ))
    }

    async fn fetch_part(&self, bucket: &str, key: &str, range: ByteRange) -> Result<Vec<u8>> {
        let location = format!("s3://{}/{} ({})", bucket, key, range.header());
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            range: Some(range.header()),
            ..Default::default()
        };

        let output = with_timeout(self.timeout, &location, self.client.get_object(request))
            .await?
            .map_err(|e| get_object_error(&location, e))?;
        let body = output.body.ok_or_else(|| Error::NotFound(location.clone()))?;

        let mut bytes = Vec::with_capacity(range.size() as usize);
        body.into_async_read()
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| Error::transport(format!("Failed to read {}", location), e))?;

        Ok(bytes)
    }
}

impl ObjectStore for RusotoObjectStore {
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<RemoteEntry>> {
        let request = ListObjectsRequest {
            bucket: bucket.to_string(),
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            ..Default::default()
        };

        let location = format!("s3://{}/{}", bucket, prefix);
        let output = self.call(&location, self.client.list_objects(request))?;

        Ok(output
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| {
                Some(RemoteEntry {
                    name: object.key?,
                    size: object.size.unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified.as_deref().and_then(parse_timestamp),
                    is_dir: false,
                })
            })
            .collect())
    }

    fn download_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> Result<u64> {
        let location = format!("s3://{}/{}", bucket, key);
        let head = self.call(
            &location,
            self.client.head_object(HeadObjectRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
        )?;

        let size = head.content_length.unwrap_or(0).max(0) as u64;
        if is_large_object(size) {
            self.download_ranged(bucket, key, size, sink)
        } else {
            self.download_whole(bucket, key, sink)
        }
    }
}

/// Whether an object of `size` bytes is fetched as ranged parts.
fn is_large_object(size: u64) -> bool {
    size > LARGE_OBJECT_THRESHOLD
}

/// Fetch `parts` in batches of at most `concurrency` and write them to `sink`
/// in range order, whatever order they complete in. The first failed part
/// aborts the download.
async fn write_parts<F, Fut>(
    parts: &[ByteRange],
    concurrency: usize,
    fetch: F,
    sink: &mut dyn Write,
) -> Result<u64>
where
    F: Fn(ByteRange) -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    let mut written = 0u64;
    for batch in parts.chunks(concurrency.max(1)) {
        let results = future::join_all(batch.iter().map(|range| fetch(*range))).await;

        for bytes in results {
            let bytes = bytes?;
            sink.write_all(&bytes)?;
            written += bytes.len() as u64;
        }
    }

    Ok(written)
}

/// The outer error is the timeout; the inner one is the request's own.
async fn with_timeout<T, E>(
    timeout: Duration,
    location: &str,
    request: impl Future<Output = std::result::Result<T, RusotoError<E>>>,
) -> Result<std::result::Result<T, RusotoError<E>>> {
    tokio::time::timeout(timeout, request).await.map_err(|_| {
        Error::transport(
            format!("Request to {} failed", location),
            io::Error::new(io::ErrorKind::TimedOut, "request timed out"),
        )
    })
}

fn rusoto_error<E>(location: &str, err: RusotoError<E>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err {
        RusotoError::Unknown(ref response) if response.status.as_u16() == 404 => {
            Error::NotFound(location.to_string())
        }
        RusotoError::Unknown(response) => Error::ProtocolStatus {
            status: response.status.to_string(),
            message: format!("{}: {}", location, response.body_as_str()),
        },
        other => Error::transport(format!("Request to {} failed", location), other),
    }
}

/// `GetObject` reports a missing key as a typed service error.
fn get_object_error(location: &str, err: RusotoError<GetObjectError>) -> Error {
    match err {
        RusotoError::Service(GetObjectError::NoSuchKey(_)) => Error::NotFound(location.to_string()),
        other => rusoto_error(location, other),
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

pub struct S3Adapter {
    connector: Arc<dyn ObjectStoreConnector>,
    staging: StagingArea,
}

impl S3Adapter {
    pub fn new(staging: StagingArea) -> Self {
        Self::with_connector(Arc::new(RusotoConnector::default()), staging)
    }

    pub fn with_connector(connector: Arc<dyn ObjectStoreConnector>, staging: StagingArea) -> Self {
        Self { connector, staging }
    }
}

impl RemoteAdapter for S3Adapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn stat(&self, destination: Arc<ParsedDestination>) -> Result<RemoteFile> {
        let path = destination.path();
        let (bucket, key) = object_location(&path);
        if bucket.is_empty() || key.is_empty() || key.ends_with('/') {
            return Err(Error::wrong_kind(path, EntryKind::File));
        }

        let store = self.connector.connect(&destination)?;
        let entry = store
            .list_objects(&bucket, &key)?
            .into_iter()
            .find(|entry| entry.name == key)
            .ok_or_else(|| Error::NotFound(format!("s3://{}/{}", bucket, key)))?;

        Ok(entry.into_remote_file(&format!("/{}/", bucket), &destination))
    }

    fn browse(&self, destination: Arc<ParsedDestination>) -> Result<Vec<RemoteFile>> {
        let (bucket, prefix) = object_location(&destination.path());
        if bucket.is_empty() {
            return Err(Error::wrong_kind(destination.path(), EntryKind::Directory));
        }

        let store = self.connector.connect(&destination)?;
        let dir = format!("/{}/", bucket);

        Ok(store
            .list_objects(&bucket, &prefix)?
            .into_iter()
            .map(|entry| entry.into_remote_file(&dir, &destination))
            .collect())
    }

    fn download(&self, remote_file: &RemoteFile) -> Result<RemoteFileContent> {
        let (bucket, key) = object_location(&remote_file.full_path());
        if bucket.is_empty() || key.is_empty() {
            return Err(Error::wrong_kind(remote_file.full_path(), EntryKind::File));
        }

        let store = self.connector.connect(&remote_file.destination)?;
        let content = self.staging.stage(&remote_file.name, |sink| {
            store.download_object(&bucket, &key, sink)
        })?;

        info!(
            "Downloaded s3://{}/{} to {}",
            bucket,
            key,
            content.path.display()
        );
        Ok(content)
    }

    fn remove(&self, _remote_file: &RemoteFile) -> Result<()> {
        Err(Error::not_implemented("remove", PROTOCOL))
    }
}
