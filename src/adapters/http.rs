//! HTTP(S) adapter.
//!
//! Stat is a HEAD request whose size comes from `Content-Length`; download is
//! a GET whose body is staged locally. HTTP has no portable listing or delete,
//! so browse and remove are not implemented.

use std::io::{self, Read};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::blocking::Client;
use reqwest::header::{HeaderName, CONTENT_LENGTH, LAST_MODIFIED};
use reqwest::Method;

use crate::adapters::RemoteAdapter;
use crate::constants::{
    ERROR_CODE_CONTENT_LENGTH_MISSING, ERROR_CONTENT_LENGTH_MISSING, ERROR_FAILED_TO_CONNECT,
};
use crate::error::{Error, Result};
use crate::models::{
    split_remote_path, ClientIdentity, ParsedDestination, RemoteFile, RemoteFileContent,
    TlsSettings,
};
use crate::staging::StagingArea;

const PROTOCOL: &str = "http";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Head,
    Get,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Sent as HTTP Basic authentication when present.
    pub basic_auth: Option<(String, String)>,
}

impl HttpRequest {
    /// Build a request for the destination URL, attaching Basic auth only
    /// when a password is present.
    pub fn for_destination(method: HttpMethod, destination: &ParsedDestination) -> Self {
        let basic_auth = destination
            .password()
            .map(|password| (destination.user().to_string(), password.to_string()));

        Self {
            method,
            url: destination.url().to_string(),
            basic_auth,
        }
    }
}

pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub content_length: Option<String>,
    pub last_modified: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn status_line(&self) -> String {
        format!("{} {}", self.status, self.reason).trim().to_string()
    }
}

/// Executes requests on one configured client.
#[cfg_attr(test, automock)]
pub trait HttpTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Builds a transport configured for one destination.
#[cfg_attr(test, automock)]
pub trait HttpConnector: Send + Sync {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn HttpTransport>>;
}

/// [`HttpConnector`] backed by a blocking reqwest client.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestConnector;

impl HttpConnector for ReqwestConnector {
    fn connect(&self, destination: &ParsedDestination) -> Result<Box<dyn HttpTransport>> {
        let mut builder = Client::builder()
            .timeout(destination.timeout())
            .connect_timeout(destination.timeout());

        if let Some(tls) = &destination.credentials().tls {
            builder = apply_tls(builder, tls)?;
        }

        let client = builder.build().map_err(|e| {
            Error::transport(
                format!("{} to {}", ERROR_FAILED_TO_CONNECT, destination.url()),
                e,
            )
        })?;

        Ok(Box::new(ReqwestTransport { client }))
    }
}

fn apply_tls(
    mut builder: reqwest::blocking::ClientBuilder,
    tls: &TlsSettings,
) -> Result<reqwest::blocking::ClientBuilder> {
    let tls_error = |e: reqwest::Error| Error::transport("Invalid TLS configuration", e);

    if let Some(identity) = &tls.identity {
        let identity = match identity {
            ClientIdentity::Pkcs12 { der, password } => {
                reqwest::Identity::from_pkcs12_der(der, password).map_err(tls_error)?
            }
            ClientIdentity::Pem {
                certificate,
                private_key,
            } => reqwest::Identity::from_pkcs8_pem(certificate, private_key).map_err(tls_error)?,
        };
        builder = builder.identity(identity);
    }

    if let Some(pem) = &tls.root_certificate_pem {
        let certificate = reqwest::Certificate::from_pem(pem).map_err(tls_error)?;
        builder = builder.add_root_certificate(certificate);
    }

    Ok(builder.danger_accept_invalid_certs(tls.accept_invalid_certs))
}

struct ReqwestTransport {
    client: Client,
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Get => Method::GET,
        };

        let mut builder = self.client.request(method, request.url.as_str());
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder
            .send()
            .map_err(|e| Error::transport(format!("Request to {} failed", request.url), e))?;

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let content_length = header(CONTENT_LENGTH);
        let last_modified = header(LAST_MODIFIED);
        let status = response.status();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            content_length,
            last_modified,
            body: Box::new(response),
        })
    }
}

pub struct HttpAdapter {
    connector: Arc<dyn HttpConnector>,
    staging: StagingArea,
}

impl HttpAdapter {
    pub fn new(staging: StagingArea) -> Self {
        Self::with_connector(Arc::new(ReqwestConnector), staging)
    }

    pub fn with_connector(connector: Arc<dyn HttpConnector>, staging: StagingArea) -> Self {
        Self { connector, staging }
    }

    fn send(&self, method: HttpMethod, destination: &ParsedDestination) -> Result<HttpResponse> {
        let transport = self.connector.connect(destination)?;
        let response = transport.execute(HttpRequest::for_destination(method, destination))?;

        if !response.is_success() {
            return Err(Error::ProtocolStatus {
                status: response.status_line(),
                message: format!("{:?} {}", method, destination.url()),
            });
        }

        Ok(response)
    }
}

impl RemoteAdapter for HttpAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn stat(&self, destination: Arc<ParsedDestination>) -> Result<RemoteFile> {
        let response = self.send(HttpMethod::Head, &destination)?;

        let length = response
            .content_length
            .as_deref()
            .ok_or_else(|| Error::Application {
                code: ERROR_CODE_CONTENT_LENGTH_MISSING,
                message: ERROR_CONTENT_LENGTH_MISSING.to_string(),
            })?;

        let size = length.trim().parse::<u64>().map_err(|_| Error::ProtocolStatus {
            status: response.status_line(),
            message: format!("invalid Content-Length '{}'", length),
        })?;

        let (dir, name) = split_remote_path(&destination.path());
        debug!("HEAD {} reported {} bytes", destination.url(), size);

        Ok(RemoteFile {
            name,
            path: dir,
            size,
            last_modified: response.last_modified.as_deref().and_then(parse_http_date),
            is_dir: false,
            destination,
        })
    }

    fn browse(&self, _destination: Arc<ParsedDestination>) -> Result<Vec<RemoteFile>> {
        Err(Error::not_implemented("browse", PROTOCOL))
    }

    fn download(&self, remote_file: &RemoteFile) -> Result<RemoteFileContent> {
        let destination = &remote_file.destination;
        let mut response = self.send(HttpMethod::Get, destination)?;

        let content = self.staging.stage(&remote_file.name, |sink| {
            io::copy(&mut response.body, sink).map_err(|e| {
                Error::transport(format!("Failed to read body of {}", destination.url()), e)
            })
        })?;

        info!("Downloaded {} to {}", destination.url(), content.path.display());
        Ok(content)
    }

    fn remove(&self, _remote_file: &RemoteFile) -> Result<()> {
        Err(Error::not_implemented("remove", PROTOCOL))
    }
}

/// `Last-Modified` uses the RFC 1123 form of HTTP-date.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{parsed, remote_file, temp_staging, staged_file_count};
    use crate::models::{Credentials, Destination};
    use std::io::Cursor;

    fn response(status: u16, content_length: Option<&str>, body: &'static [u8]) -> HttpResponse {
        HttpResponse {
            status,
            reason: String::new(),
            content_length: content_length.map(str::to_string),
            last_modified: None,
            body: Box::new(Cursor::new(body)),
        }
    }

    /// Adapter whose connector hands out a transport answering with `respond`.
    fn adapter_with<F>(staging: StagingArea, respond: F) -> HttpAdapter
    where
        F: Fn(HttpRequest) -> Result<HttpResponse> + Send + Sync + Clone + 'static,
    {
        let mut connector = MockHttpConnector::new();
        connector.expect_connect().returning(move |_| {
            let respond = respond.clone();
            let mut transport = MockHttpTransport::new();
            transport.expect_execute().times(1).returning(move |req| respond(req));
            Ok(Box::new(transport) as Box<dyn HttpTransport>)
        });
        HttpAdapter::with_connector(Arc::new(connector), staging)
    }

    #[test]
    fn test_stat_reads_content_length() {
        let adapter = adapter_with(StagingArea::default(), |req| {
            assert_eq!(req.method, HttpMethod::Head);
            assert_eq!(req.url, "https://example.com/files/report.pdf");
            Ok(response(200, Some("1024"), b""))
        });

        let file = adapter
            .stat(parsed("https://example.com/files/report.pdf"))
            .unwrap();

        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.path, "/files/");
        assert_eq!(file.size, 1024);
        assert!(!file.is_dir);
    }

    #[test]
    fn test_stat_without_content_length_is_code_42() {
        let adapter = adapter_with(StagingArea::default(), |_| Ok(response(200, None, b"")));

        let err = adapter.stat(parsed("https://example.com/a")).unwrap_err();
        assert_eq!(err.code(), Some(42));
        assert_eq!(err.to_string(), "42:unable to determine file size");
    }

    #[test]
    fn test_stat_non_success_is_protocol_status() {
        let adapter = adapter_with(StagingArea::default(), |_| Ok(response(404, Some("0"), b"")));

        let err = adapter.stat(parsed("https://example.com/missing")).unwrap_err();
        assert!(matches!(err, Error::ProtocolStatus { ref status, .. } if status.starts_with("404")));
    }

    #[test]
    fn test_stat_parses_last_modified() {
        let adapter = adapter_with(StagingArea::default(), |_| {
            let mut resp = response(200, Some("3"), b"");
            resp.last_modified = Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string());
            Ok(resp)
        });

        let file = adapter.stat(parsed("http://example.com/x")).unwrap();
        assert_eq!(
            file.last_modified.unwrap().to_rfc3339(),
            "2015-10-21T07:28:00+00:00"
        );
    }

    #[test]
    fn test_basic_auth_only_with_password() {
        let with_password = Destination::new("https://example.com/a")
            .with_credentials(Credentials::basic("alice", "s3cret"))
            .resolve()
            .unwrap();
        let request = HttpRequest::for_destination(HttpMethod::Head, &with_password);
        assert_eq!(
            request.basic_auth,
            Some(("alice".to_string(), "s3cret".to_string()))
        );

        let user_only = Destination::new("https://example.com/a")
            .with_credentials(Credentials::new("alice"))
            .resolve()
            .unwrap();
        let request = HttpRequest::for_destination(HttpMethod::Head, &user_only);
        assert_eq!(request.basic_auth, None);
    }

    #[test]
    fn test_download_stages_body() {
        let (_dir, staging) = temp_staging();
        let adapter = adapter_with(staging, |req| {
            assert_eq!(req.method, HttpMethod::Get);
            Ok(response(200, Some("11"), b"hello world"))
        });

        let file = remote_file("http://example.com/greeting.txt");
        let mut content = adapter.download(&file).unwrap();

        assert_eq!(content.name, "greeting.txt");
        let mut body = String::new();
        content.blob.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello world");

        content.blob.close().unwrap();
        assert!(!content.path.exists());
    }

    #[test]
    fn test_download_failure_stages_nothing() {
        let (dir, staging) = temp_staging();
        let adapter = adapter_with(staging, |_| {
            Ok(response(500, None, b"boom"))
        });

        let file = remote_file("http://example.com/a.bin");
        assert!(adapter.download(&file).is_err());
        assert_eq!(staged_file_count(dir.path()), 0);
    }

    #[test]
    fn test_browse_and_remove_not_implemented() {
        let adapter = HttpAdapter::with_connector(
            Arc::new(MockHttpConnector::new()),
            StagingArea::default(),
        );
        let dest = parsed("https://example.com/dir/");

        assert!(matches!(
            adapter.browse(Arc::clone(&dest)),
            Err(Error::NotImplemented { operation: "browse", .. })
        ));

        let file = RemoteFile::new("a", "/dir/", dest);
        assert!(matches!(
            adapter.remove(&file),
            Err(Error::NotImplemented { operation: "remove", .. })
        ));
    }
}
