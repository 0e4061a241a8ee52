//! Global constants for the universal network adapter.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Scheme identifiers used as registry keys
pub const SCHEME_HTTP: &str = "http";
pub const SCHEME_HTTPS: &str = "https";
pub const SCHEME_FTP: &str = "ftp";
pub const SCHEME_FTPS: &str = "ftps";
pub const SCHEME_SFTP: &str = "sftp";
pub const SCHEME_S3: &str = "s3";

// Timeout constants
/// Default connection timeout in seconds when a destination does not set one
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

// Default ports
pub const FTP_DEFAULT_PORT: u16 = 21;
/// Implicit FTPS listens on its own port
pub const FTPS_IMPLICIT_DEFAULT_PORT: u16 = 990;
pub const SFTP_DEFAULT_PORT: u16 = 22;

// Object storage constants
/// Region used for S3-compatible endpoints when none is configured
pub const S3_DEFAULT_REGION: &str = "us-east-1";

/// Scheme used to reach the S3 endpoint named by the destination host
pub const S3_DEFAULT_ENDPOINT_SCHEME: &str = "https";

/// Ranged download part size (8MB)
pub const S3_DOWNLOAD_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Objects above this size are fetched as ranged parts (50MB)
pub const LARGE_OBJECT_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Maximum ranged part requests in flight per object
pub const S3_MAX_CONCURRENT_PARTS: usize = 4;

// Local staging constants
/// Copy buffer size for staging remote bytes (64KB)
pub const STAGING_BUFFER_SIZE: usize = 64 * 1024;

// Application error codes
/// HEAD response carried no Content-Length header
pub const ERROR_CODE_CONTENT_LENGTH_MISSING: i32 = 42;

// Error messages
pub const ERROR_CONTENT_LENGTH_MISSING: &str = "unable to determine file size";
pub const ERROR_FAILED_TO_CONNECT: &str = "Failed to connect";
pub const ERROR_FAILED_TO_CREATE_SESSION: &str = "Failed to create SSH session";
pub const ERROR_FAILED_TO_CREATE_SFTP: &str = "Failed to create SFTP subsystem";
pub const ERROR_AUTHENTICATION_FAILED: &str = "Authentication failed";
pub const ERROR_NO_AUTH_METHODS: &str = "no password or private key supplied";
