//! Security utilities.
//!
//! - Credential scrubbing so URLs and wire-client errors never leak secrets
//!   into logs or error messages
//! - File-name sanitization for locally staged downloads
//! - Output path validation for the command-line front end

pub mod credential_scrubber;
pub mod path_validator;

pub use credential_scrubber::{safe_error_message, scrub_credentials};
pub use path_validator::{sanitize_filename, validate_output_path};
