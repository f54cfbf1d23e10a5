//! Location list parsing
//!
//! A location list is UTF-8 text with one filesystem path per line, read
//! either from a file named on the command line or from standard input.
//! Lines are trimmed; blank lines are reported and skipped rather than
//! treated as paths. The trimmed strings are the identity used as manifest
//! keys, except that paths naming an existing regular file are resolved to
//! absolute form.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{OffsiteError, Result};

/// Read the location list from a file, or from standard input when no file
/// is given
///
/// # Errors
///
/// Returns [`OffsiteError::Config`] when the file cannot be read or the
/// list contains no usable locations.
pub fn read_locations(source: Option<&Path>) -> Result<Vec<PathBuf>> {
    let contents = match source {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            OffsiteError::config(format!("cannot read location list {:?}: {}", path, e))
        })?,
        None => {
            debug!("Reading location list from standard input");
            let mut buf = String::new();
            std::io::stdin().lock().read_to_string(&mut buf)?;
            buf
        }
    };

    let locations = parse_locations(&contents);
    if locations.is_empty() {
        return Err(OffsiteError::config("location list is empty"));
    }
    Ok(locations)
}

/// Parse location-list text into paths
///
/// Blank lines are skipped with a warning. Paths naming an existing regular
/// file are resolved to absolute form so the derived artifact lands next to
/// the real file; directory paths keep their given spelling.
pub fn parse_locations(input: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            warn!("Skipping blank location on line {}", idx + 1);
            continue;
        }
        let path = PathBuf::from(trimmed);
        if path.is_file() {
            match std::path::absolute(&path) {
                Ok(abs) => locations.push(abs),
                Err(_) => locations.push(path),
            }
        } else {
            locations.push(path);
        }
    }
    debug!("Parsed {} location(s)", locations.len());
    locations
}
