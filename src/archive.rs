//! Archive stage: compression and restoration of locations
//!
//! Turns each configured location into a single compressed artifact and
//! reverses the process during retrieval. Regular files become gzip copies
//! with a `.gz` suffix; directories become gzip-compressed tar archives with
//! a `.tgz` suffix, rooted under the directory's own name so restoration
//! reproduces the original tree.
//!
//! All transforms stream through fixed-size buffers; no artifact is ever
//! buffered whole in memory. Source locations are never mutated or deleted,
//! only derived artifacts are.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::{debug, info};

use crate::error::{OffsiteError, Result};
use crate::types::Artifact;
use crate::utils::{path_size, path_with_suffix, strip_path_suffix};

/// Suffix for gzip-compressed regular files.
pub const GZIP_SUFFIX: &str = ".gz";
/// Suffix for gzip-compressed tar archives of directory trees.
pub const TAR_GZIP_SUFFIX: &str = ".tgz";

/// Compress a location into a single artifact
///
/// A regular file is gzip-compressed to `location + ".gz"`. Anything else is
/// treated as a directory root and packed into a gzip-compressed tar at
/// `location + ".tgz"` (trailing separators trimmed first), with the tree
/// stored under the directory's own name.
///
/// # Arguments
///
/// * `location` - File or directory root to compress
///
/// # Errors
///
/// Returns [`OffsiteError::Archive`] naming the offending location when the
/// location is missing or any part of the compression fails.
pub fn archive(location: &Path) -> Result<Artifact> {
    if !location.exists() {
        return Err(OffsiteError::archive(location, "location does not exist"));
    }

    let source_size = path_size(location)
        .map_err(|e| OffsiteError::archive(location, format!("cannot probe size: {}", e)))?;

    let (artifact_path, from_directory) = if location.is_file() {
        let path = path_with_suffix(location, GZIP_SUFFIX);
        compress_file(location, &path)?;
        (path, false)
    } else {
        let path = path_with_suffix(location, TAR_GZIP_SUFFIX);
        compress_directory(location, &path)?;
        (path, true)
    };

    let size = fs::metadata(&artifact_path)
        .map_err(|e| OffsiteError::archive(&artifact_path, e.to_string()))?
        .len();
    info!(
        "Archived {:?} -> {:?} ({} -> {} bytes)",
        location, artifact_path, source_size, size
    );

    Ok(Artifact {
        path: artifact_path,
        source: location.to_path_buf(),
        from_directory,
        size,
        source_size,
    })
}

/// Gzip a single file to the artifact path
fn compress_file(location: &Path, artifact_path: &Path) -> Result<()> {
    let mut source = File::open(location)
        .map_err(|e| OffsiteError::archive(location, format!("cannot open: {}", e)))?;
    let target = File::create(artifact_path)
        .map_err(|e| OffsiteError::archive(artifact_path, format!("cannot create: {}", e)))?;

    let mut encoder = GzEncoder::new(target, Compression::default());
    io::copy(&mut source, &mut encoder)
        .map_err(|e| OffsiteError::archive(location, format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| OffsiteError::archive(artifact_path, format!("compression failed: {}", e)))?;
    Ok(())
}

/// Pack a directory tree into a gzip-compressed tar at the artifact path
fn compress_directory(location: &Path, artifact_path: &Path) -> Result<()> {
    let root_name = location
        .file_name()
        .ok_or_else(|| OffsiteError::archive(location, "cannot determine archive root name"))?
        .to_os_string();

    let target = File::create(artifact_path)
        .map_err(|e| OffsiteError::archive(artifact_path, format!("cannot create: {}", e)))?;
    let encoder = GzEncoder::new(target, Compression::default());
    let mut builder = Builder::new(encoder);

    builder
        .append_dir_all(&root_name, location)
        .map_err(|e| OffsiteError::archive(location, format!("tar failed: {}", e)))?;
    builder
        .into_inner()
        .map_err(|e| OffsiteError::archive(artifact_path, format!("tar failed: {}", e)))?
        .finish()
        .map_err(|e| OffsiteError::archive(artifact_path, format!("compression failed: {}", e)))?;
    Ok(())
}

/// Restore an archive into a destination directory
///
/// The inverse of [`archive`], dispatching on the artifact suffix: `.tgz`
/// archives expand into a tree under `dest_dir`, `.gz` archives decompress
/// to a single file with the suffix stripped. The archive file itself is
/// removed once restoration succeeds.
///
/// # Arguments
///
/// * `archive_path` - The `.gz` or `.tgz` file to restore
/// * `dest_dir` - Directory the restored files land in
///
/// # Returns
///
/// Paths of the restored entries, one per file or directory written.
///
/// # Errors
///
/// Returns [`OffsiteError::Archive`] for unrecognized suffixes, corrupt
/// archives or I/O failures.
pub fn restore(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    if !dest_dir.exists() {
        fs::create_dir_all(dest_dir)
            .map_err(|e| OffsiteError::archive(dest_dir, format!("cannot create: {}", e)))?;
    }

    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let restored = if name.ends_with(TAR_GZIP_SUFFIX) {
        restore_directory(archive_path, dest_dir)?
    } else if name.ends_with(GZIP_SUFFIX) {
        vec![restore_file(archive_path, dest_dir)?]
    } else {
        return Err(OffsiteError::archive(
            archive_path,
            "unrecognized archive suffix (expected .gz or .tgz)",
        ));
    };

    fs::remove_file(archive_path)
        .map_err(|e| OffsiteError::archive(archive_path, format!("cannot remove: {}", e)))?;
    info!("Restored {:?} into {:?}", archive_path, dest_dir);
    Ok(restored)
}

/// Decompress a `.gz` artifact to a single file in the destination
fn restore_file(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let stem = strip_path_suffix(archive_path, GZIP_SUFFIX)
        .and_then(|p| p.file_name().map(|n| n.to_os_string()))
        .ok_or_else(|| OffsiteError::archive(archive_path, "cannot determine output name"))?;
    let dest = dest_dir.join(stem);

    let source = File::open(archive_path)
        .map_err(|e| OffsiteError::archive(archive_path, format!("cannot open: {}", e)))?;
    let mut decoder = GzDecoder::new(source);
    let mut target = File::create(&dest)
        .map_err(|e| OffsiteError::archive(&dest, format!("cannot create: {}", e)))?;
    io::copy(&mut decoder, &mut target)
        .map_err(|e| OffsiteError::archive(archive_path, format!("decompression failed: {}", e)))?;
    Ok(dest)
}

/// Unpack a `.tgz` artifact into the destination directory
fn restore_directory(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let source = File::open(archive_path)
        .map_err(|e| OffsiteError::archive(archive_path, format!("cannot open: {}", e)))?;
    let mut tar = Archive::new(GzDecoder::new(source));

    let mut restored = Vec::new();
    let entries = tar
        .entries()
        .map_err(|e| OffsiteError::archive(archive_path, format!("corrupt archive: {}", e)))?;
    for entry in entries {
        let mut entry = entry
            .map_err(|e| OffsiteError::archive(archive_path, format!("corrupt archive: {}", e)))?;
        let entry_path = entry
            .path()
            .map_err(|e| OffsiteError::archive(archive_path, format!("corrupt archive: {}", e)))?
            .into_owned();
        entry.unpack_in(dest_dir).map_err(|e| {
            OffsiteError::archive(archive_path, format!("extraction failed: {}", e))
        })?;
        restored.push(dest_dir.join(entry_path));
    }
    Ok(restored)
}

/// Delete an artifact file
///
/// Used after its upload has been confirmed, and during the cleanup that
/// follows an encryption failure. Never touches source locations.
///
/// # Errors
///
/// Returns [`OffsiteError::Archive`] when the file cannot be removed.
pub fn discard(artifact_path: &Path) -> Result<()> {
    fs::remove_file(artifact_path)
        .map_err(|e| OffsiteError::archive(artifact_path, format!("cannot discard: {}", e)))?;
    debug!("Discarded artifact {:?}", artifact_path);
    Ok(())
}
