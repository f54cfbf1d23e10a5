//! Utility functions for offsite
//!
//! This module provides common utility functions used throughout the offsite
//! library, including size probing, path suffix manipulation, atomic file
//! writing and human-readable byte formatting.
//!
//! ## Categories of Utilities
//!
//! ### File Operations
//! - Atomic file writing
//! - Directory creation for output paths
//!
//! ### Path Manipulation
//! - Appending and stripping artifact suffixes (`.gz`, `.tgz`, `.enc`)
//! - Location size probing (files and directory trees)
//!
//! ### Data Processing
//! - Byte formatting (human-readable sizes)

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// Total size of a location in bytes
///
/// Returns the file size for regular files and the sum of all contained file
/// sizes for directories. Symbolic links are not followed.
///
/// # Arguments
///
/// * `path` - The location to probe
///
/// # Errors
///
/// - [`OffsiteError::Io`](crate::error::OffsiteError::Io) if the location cannot be read
/// - [`OffsiteError::WalkDir`](crate::error::OffsiteError::WalkDir) if a directory entry cannot be visited
pub fn path_size(path: &Path) -> Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    trace!("Probed {:?}: {} bytes", path, total);
    Ok(total)
}

/// Strip trailing separators and append a suffix to a location path
///
/// `/tmp/photos/` with suffix `.tgz` becomes `/tmp/photos.tgz`; a bare file
/// path simply gains the suffix.
pub fn path_with_suffix(location: &Path, suffix: &str) -> PathBuf {
    let mut s = location.as_os_str().to_string_lossy().into_owned();
    while s.len() > 1 && s.ends_with(std::path::MAIN_SEPARATOR) {
        s.pop();
    }
    s.push_str(suffix);
    PathBuf::from(s)
}

/// Strip a known suffix from a path, if present
///
/// Used to turn `photos.tgz.enc` back into `photos.tgz` and `a.txt.gz` back
/// into `a.txt` during retrieval. Returns `None` when the path does not end
/// in the suffix.
pub fn strip_path_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let s = path.as_os_str().to_string_lossy();
    s.strip_suffix(suffix).map(PathBuf::from)
}

/// Create the parent directory of an output path if it is missing
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            trace!("Created directory {:?}", parent);
        }
    }
    Ok(())
}

/// Format bytes in human-readable form
///
/// Converts a byte count into a human-readable string using appropriate
/// units (B, KB, MB, GB, TB, PB). Uses 1024 as the conversion factor
/// following binary conventions.
///
/// # Arguments
///
/// * `bytes` - Number of bytes to format
///
/// # Example
///
/// ```rust
/// use offsite::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// Performs an atomic write operation by first writing to a temporary file
/// and then renaming it to the target location. This ensures that the target
/// file is never in a partially written state, preventing corruption.
///
/// # Arguments
///
/// * `path` - Target file path to write to
/// * `content` - Byte content to write to the file
///
/// # Errors
///
/// - [`OffsiteError::Io`](crate::error::OffsiteError::Io) if writing to the temporary file fails
/// - [`OffsiteError::Io`](crate::error::OffsiteError::Io) if the atomic rename operation fails
///
/// # Example
///
/// ```rust,ignore
/// use offsite::utils::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// atomic_write(Path::new("output.csv"), b"location,size\n")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    // Write to temp file
    fs::write(&temp_path, content)?;

    // Atomic rename
    fs::rename(&temp_path, path)?;

    Ok(())
}
