//! # universal_network_adapter
//!
//! One interface for working with remote files over HTTP(S), FTP(S), SFTP and
//! S3-compatible object storage.
//!
//! ## Overview
//!
//! A caller describes *what* it wants with a [`Destination`] (URL, optional
//! protocol override, optional credentials, optional timeout) and asks the
//! [`AdapterRegistry`] to stat, browse, download or remove it. The registry
//! resolves the destination, picks the adapter registered for its scheme and
//! dispatches. Downloads are staged in a local file and handed back as a
//! self-deleting [`StreamingBlob`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::io::Read;
//! use universal_network_adapter::{AdapterRegistry, Credentials, Destination, RemoteFile};
//!
//! # fn main() -> universal_network_adapter::Result<()> {
//! let registry = AdapterRegistry::new();
//!
//! let destination = Destination::new("sftp://sftp.example.com/files/report.csv")
//!     .with_credentials(Credentials::basic("deploy", "secret"));
//!
//! let file = registry.stat(&destination)?;
//! println!("{} is {} bytes", file.name, file.size);
//!
//! let mut content = registry.download(&RemoteFile::from_destination(&destination)?)?;
//! let mut text = String::new();
//! content.blob.read_to_string(&mut text)?;
//! content.blob.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Extending
//!
//! Any type implementing [`RemoteAdapter`] can be registered for a new scheme
//! with [`AdapterRegistry::register`]; the last registration for a scheme wins.
//!
//! ## Module Organization
//!
//! - [`models`]: destinations, credentials and remote file descriptors
//! - [`registry`]: scheme-keyed adapter table
//! - [`adapters`]: HTTP, FTP, SFTP and S3 implementations
//! - [`staging`]: local staging of downloads
//! - [`config`]: YAML configuration and credential profiles
//! - [`security`]: credential scrubbing and path hygiene
//! - [`error`]: error taxonomy
//! - [`cli`]: command-line interface of the `una` binary

/// Protocol adapters behind the uniform four-operation contract
pub mod adapters;

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Configuration loading and credential profiles
pub mod config;

/// Application constants and configuration values
pub mod constants;

pub mod error;

/// Core data models and structures
pub mod models;

pub mod registry;

/// Security utilities for path validation and credential protection
pub mod security;

/// Local staging of downloaded bytes
pub mod staging;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;

pub use adapters::{RemoteAdapter, RemoteEntry};
pub use error::{EntryKind, Error, Result};
pub use models::{
    ClientIdentity, Credentials, Destination, ParsedDestination, RemoteFile, RemoteFileContent,
    TlsMode, TlsSettings,
};
pub use registry::AdapterRegistry;
pub use staging::{StagingArea, StreamingBlob};
