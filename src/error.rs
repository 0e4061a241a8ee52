//! Error taxonomy shared by the resolver, the registry and every adapter.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::security::scrub_credentials;

/// Boxed source error coming from a wire-protocol client.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What a remote entry was expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed URL '{url}': {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no adapter registered for scheme '{scheme}' (url: {url})")]
    UnknownScheme { scheme: String, url: String },

    #[error("authentication failed for {target}: {reason}")]
    Authentication { target: String, reason: String },

    #[error("remote entry not found: {0}")]
    NotFound(String),

    #[error("expected a {expected} at {path}")]
    WrongKind { path: String, expected: EntryKind },

    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("remote returned status {status}: {message}")]
    ProtocolStatus { status: String, message: String },

    #[error("{operation} is not implemented for {protocol}")]
    NotImplemented {
        operation: &'static str,
        protocol: &'static str,
    },

    /// Structured application error, raised where the wire client has no
    /// equivalent concept.
    #[error("{code}:{message}")]
    Application { code: i32, message: String },

    #[error("local staging error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap a wire-client failure; the context is scrubbed before it is stored.
    pub fn transport<E>(context: impl AsRef<str>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Transport {
            context: scrub_credentials(context.as_ref()),
            source: source.into(),
        }
    }

    pub fn authentication(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Authentication {
            target: target.into(),
            reason: scrub_credentials(&reason.to_string()),
        }
    }

    pub fn not_implemented(operation: &'static str, protocol: &'static str) -> Self {
        Error::NotImplemented { operation, protocol }
    }

    pub fn wrong_kind(path: impl Into<String>, expected: EntryKind) -> Self {
        Error::WrongKind {
            path: path.into(),
            expected,
        }
    }

    /// Numeric code for [`Error::Application`], `None` for every other variant.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Application { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
