//! Caller-facing destinations and their resolved, protocol-ready form.

use std::time::Duration;

use log::debug;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::constants::DEFAULT_CONNECTION_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::models::credentials::Credentials;
use crate::security::scrub_credentials;

/// An unresolved request for a remote resource.
///
/// `url` follows `scheme://[user[:password]@]host[:port]/path`. `protocol`
/// overrides the URL scheme at dispatch time.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    pub url: String,
    pub protocol: Option<String>,
    pub credentials: Option<Credentials>,
    pub timeout: Option<Duration>,
}

impl Destination {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn resolve(&self) -> Result<ParsedDestination> {
        resolve(self)
    }
}

/// Fully resolved form of a [`Destination`].
///
/// The stored URL never carries userinfo.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDestination {
    url: String,
    protocol: Option<String>,
    credentials: Credentials,
    parsed_url: Url,
    timeout: Duration,
}

impl ParsedDestination {
    /// Normalized URL, userinfo stripped.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn parsed_url(&self) -> &Url {
        &self.parsed_url
    }

    /// Explicit protocol override, exactly as supplied.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Scheme parsed from the URL (always lowercase).
    pub fn scheme(&self) -> &str {
        self.parsed_url.scheme()
    }

    /// Registry key: the protocol override when present, the URL scheme otherwise.
    pub fn dispatch_scheme(&self) -> String {
        match self.protocol() {
            Some(protocol) if !protocol.is_empty() => protocol.to_ascii_lowercase(),
            _ => self.scheme().to_string(),
        }
    }

    pub fn host(&self) -> &str {
        self.parsed_url.host_str().unwrap_or_default()
    }

    /// Port written in the URL. Scheme defaults are not applied: the adapter
    /// that serves the destination decides which default it dials.
    pub fn port(&self) -> Option<u16> {
        self.parsed_url.port()
    }

    /// `host:port`, falling back to the adapter's `default_port` when the URL
    /// has none.
    pub fn address(&self, default_port: u16) -> String {
        format!("{}:{}", self.host(), self.port().unwrap_or(default_port))
    }

    /// Percent-decoded URL path.
    pub fn path(&self) -> String {
        percent_decode_str(self.parsed_url.path())
            .decode_utf8_lossy()
            .into_owned()
    }

    pub fn user(&self) -> &str {
        &self.credentials.user
    }

    pub fn password(&self) -> Option<&str> {
        self.credentials.password()
    }
}

/// Resolve a destination into its protocol-ready form.
///
/// Explicit credentials always win, even when only partially populated; URL
/// userinfo is consulted only when none were supplied. Userinfo is stripped
/// from the stored URL either way.
pub fn resolve(destination: &Destination) -> Result<ParsedDestination> {
    let mut parsed_url = Url::parse(&destination.url).map_err(|source| Error::MalformedUrl {
        url: scrub_credentials(&destination.url),
        source,
    })?;

    let credentials = match &destination.credentials {
        Some(explicit) => explicit.clone(),
        None => credentials_from_userinfo(&parsed_url),
    };

    if !parsed_url.username().is_empty() || parsed_url.password().is_some() {
        // Userinfo can only be present on URLs with an authority, so neither call fails.
        let _ = parsed_url.set_username("");
        let _ = parsed_url.set_password(None);
    }

    let parsed = ParsedDestination {
        url: parsed_url.to_string(),
        protocol: destination.protocol.clone(),
        credentials,
        parsed_url,
        timeout: destination
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS)),
    };

    debug!(
        "Resolved {} (scheme: {}, timeout: {:?})",
        parsed.url,
        parsed.dispatch_scheme(),
        parsed.timeout
    );

    Ok(parsed)
}

fn credentials_from_userinfo(url: &Url) -> Credentials {
    let decode = |raw: &str| percent_decode_str(raw).decode_utf8_lossy().into_owned();

    Credentials {
        user: decode(url.username()),
        password: url.password().map(decode),
        ..Default::default()
    }
}
