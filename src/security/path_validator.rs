//! Local path hygiene for staged downloads and CLI output targets.
//!
//! Remote file names come from servers we do not control, so they are
//! sanitized before being used as part of a local file name.

use anyhow::{anyhow, Result};
use std::path::Path;

/// Reduce a remote entry name to one local path component for a staged file.
///
/// S3 keys and FTP listings may carry `/` or `\\`, so separators become `_`
/// and the result never leaves the staging directory. Characters Windows
/// rejects are replaced too, and a name that ends up empty is `unnamed`.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = String::with_capacity(filename.len());

    for ch in filename.chars() {
        match ch {
            '/' | '\\' => sanitized.push('_'),
            '\0' => continue,
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => sanitized.push('_'),
            c if c.is_control() => sanitized.push('_'),
            c => sanitized.push(c),
        }
    }

    // "." and ".." would name the staging directory or its parent.
    if !sanitized.is_empty() && sanitized.chars().all(|c| c == '.') {
        sanitized = format!("_{}", sanitized);
    }

    let trimmed = sanitized.trim_matches(|c| c == '.' || c == ' ').to_string();

    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

/// Check the `--output` path `una download` copies a staged file to.
///
/// Refuses operating-system directories and parents that exist but are
/// read-only, before any bytes are fetched.
pub fn validate_output_path(path: &Path) -> Result<()> {
    let path_str = path.to_string_lossy().to_lowercase();

    let dangerous_paths = [
        "/etc",
        "/sys",
        "/proc",
        "/dev",
        "/boot",
        "c:\\windows",
        "c:\\program files",
        "c:\\programdata",
        "/system",
        "/library",
        "/usr",
    ];

    for dangerous in dangerous_paths {
        if path_str.starts_with(dangerous) {
            return Err(anyhow!(
                "Cannot write to system directory: {}",
                path.display()
            ));
        }
    }

    if let Some(parent) = path.parent() {
        if parent.exists() && parent.metadata()?.permissions().readonly() {
            return Err(anyhow!(
                "Parent directory is read-only: {}",
                parent.display()
            ));
        }
    }

    Ok(())
}
