//! Manifest store: durable record of last-known backups
//!
//! The manifest is a CSV table with the fixed header
//! `location,size,timestamp,public_id`, one row per location. The location
//! string is the unique key; `size` is the source location's byte count,
//! `timestamp` the RFC 3339 UTC moment the upload was confirmed and
//! `public_id` the remote identifier returned by the blob store.
//!
//! Writes are merge-on-write: rows for locations touched by the current run
//! are replaced, every other row passes through unchanged. Saving goes
//! through a temporary file and an atomic rename, so a crashed run leaves
//! the prior manifest intact. A missing or malformed header is fatal; the
//! store never guesses a schema.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OffsiteError, Result};
use crate::utils::{atomic_write, ensure_parent_dir};

/// Expected manifest header fields, in order.
pub const MANIFEST_HEADER: [&str; 4] = ["location", "size", "timestamp", "public_id"];

/// One persisted backup record, keyed by location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// The location string exactly as configured
    pub location: String,
    /// Total size of the source location in bytes
    pub size: u64,
    /// When the upload was confirmed
    pub timestamp: DateTime<Utc>,
    /// Remote identifier returned by the blob store
    pub public_id: String,
}

/// The full set of manifest entries, in table order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Rows in persisted order
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no rows
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the entry for a location, if present
    pub fn get(&self, location: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.location == location)
    }

    /// Merge this run's entries into the manifest
    ///
    /// Drops every row whose location is in `touched`, appends the new
    /// entries and passes all other rows through unchanged. The result has
    /// at most one row per location with the most recent run winning.
    pub fn merge(self, new_entries: Vec<ManifestEntry>, touched: &HashSet<String>) -> Manifest {
        let mut entries: Vec<ManifestEntry> = self
            .entries
            .into_iter()
            .filter(|e| !touched.contains(&e.location))
            .collect();
        entries.extend(new_entries);
        Manifest { entries }
    }
}

/// Loads and persists the manifest table
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Create a store backed by the given CSV file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, requiring the file to exist
    ///
    /// # Errors
    ///
    /// Returns [`OffsiteError::Manifest`] when the file is missing, the
    /// header differs from `location,size,timestamp,public_id` or a row
    /// cannot be parsed.
    pub fn load(&self) -> Result<Manifest> {
        let file = File::open(&self.path).map_err(|e| {
            OffsiteError::manifest(format!("cannot read manifest {:?}: {}", self.path, e))
        })?;
        let mut reader = csv::Reader::from_reader(file);

        let headers = reader.headers()?.clone();
        if headers.iter().ne(MANIFEST_HEADER) {
            return Err(OffsiteError::manifest(format!(
                "manifest {:?} has header [{}], expected [{}]",
                self.path,
                headers.iter().collect::<Vec<_>>().join(","),
                MANIFEST_HEADER.join(",")
            )));
        }

        let mut entries = Vec::new();
        for row in reader.deserialize::<ManifestEntry>() {
            entries.push(row?);
        }
        debug!("Loaded {} manifest row(s) from {:?}", entries.len(), self.path);
        Ok(Manifest { entries })
    }

    /// Load the manifest, treating a missing file as empty
    ///
    /// Used by the generation direction, where a first run has no manifest
    /// yet. Any existing file is still validated in full.
    pub fn load_or_default(&self) -> Result<Manifest> {
        if self.path.exists() {
            self.load()
        } else {
            debug!("No manifest at {:?}, starting empty", self.path);
            Ok(Manifest::default())
        }
    }

    /// Persist the manifest atomically
    ///
    /// The full table is serialized to a temporary file which is then
    /// renamed over the target, so the prior manifest survives a failed
    /// write. Parent directories are created on demand.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if manifest.is_empty() {
            // serialize() only emits the header alongside a row
            writer.write_record(MANIFEST_HEADER)?;
        } else {
            for entry in &manifest.entries {
                writer.serialize(entry)?;
            }
        }
        let buf = writer
            .into_inner()
            .map_err(|e| OffsiteError::manifest(format!("cannot serialize manifest: {}", e)))?;

        ensure_parent_dir(&self.path)?;
        atomic_write(&self.path, &buf)?;
        info!("Saved {} manifest row(s) to {:?}", manifest.len(), self.path);
        Ok(())
    }
}
