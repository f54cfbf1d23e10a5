//! Core data types used throughout the offsite library
//!
//! This module contains fundamental data structures that are shared across
//! different components of the library.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Artifacts**: `Artifact`, `EncryptedArtifact` - transient files produced by a run
//! - **Operations**: `BackupReport`, `RetrievalReport` - results of completed runs
//! - **Configuration**: `BackupOptions`, `RetrieveOptions` - run parameters
//! - **Control**: `CancelToken` - cooperative cancellation between locations
//!
//! ## Examples
//!
//! ```rust
//! use offsite::types::BackupOptions;
//! use std::path::PathBuf;
//!
//! // Configure an encrypted run against a custom manifest
//! let options = BackupOptions {
//!     encrypt: true,
//!     manifest_path: PathBuf::from("reports/summary.csv"),
//! };
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{OffsiteError, Result};

/// A transient compressed file derived from one configured location
///
/// Artifacts are created by the archive stage, consumed by the later stages
/// and deleted once their upload has been confirmed. They never outlive a
/// single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    /// Path of the compressed file on disk (`.gz` or `.tgz`)
    pub path: PathBuf,
    /// The location this artifact was derived from
    pub source: PathBuf,
    /// Whether the source was a directory root
    pub from_directory: bool,
    /// Size of the compressed file in bytes
    pub size: u64,
    /// Total size of the source location in bytes
    pub source_size: u64,
}

/// An artifact sealed under a password-derived key
///
/// The ciphertext file starts with the 16-byte key-derivation salt followed
/// by length-prefixed sealed frames. The compressed artifact it was produced
/// from is kept alongside until cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedArtifact {
    /// Path of the ciphertext file on disk (`.gz.enc` or `.tgz.enc`)
    pub path: PathBuf,
    /// The compressed artifact this ciphertext seals
    pub inner: Artifact,
}

/// Parameters for a backup-generation run
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Whether artifacts are encrypted before upload
    pub encrypt: bool,
    /// Where the manifest table is persisted
    pub manifest_path: PathBuf,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            encrypt: false,
            manifest_path: PathBuf::from("reports/summary.csv"),
        }
    }
}

/// Parameters for a retrieval run
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Where the manifest table is read from
    pub manifest_path: PathBuf,
    /// Directory downloaded artifacts land in before restoration
    pub download_dir: PathBuf,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("reports/summary.csv"),
            download_dir: PathBuf::from("backups"),
        }
    }
}

/// Result of a completed backup-generation run
///
/// Logged as the terminal success record and returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    /// Number of locations processed
    pub locations: usize,
    /// Number of artifacts confirmed uploaded
    pub uploaded: usize,
    /// Total size of the source locations in bytes
    pub source_bytes: u64,
    /// Total bytes shipped to the remote store
    pub uploaded_bytes: u64,
    /// Whether artifacts were encrypted before upload
    pub encrypted: bool,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
    /// Host the run executed on
    pub hostname: String,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
}

/// Result of a completed retrieval run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalReport {
    /// Number of manifest entries retrieved
    pub entries: usize,
    /// Total bytes downloaded from the remote store
    pub downloaded_bytes: u64,
    /// Number of files and directories restored to disk
    pub restored: usize,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
}

/// Cooperative cancellation signal checked between locations
///
/// Cloning shares the underlying flag, so a handler registered by the caller
/// can stop a pipeline that is already running. The flag is only consulted
/// between locations; an in-flight transfer finishes first.
///
/// # Examples
///
/// ```rust
/// use offsite::types::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run sharing this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Return `Err(Cancelled)` if cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(OffsiteError::Cancelled)
        } else {
            Ok(())
        }
    }
}
