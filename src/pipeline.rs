//! Backup pipeline orchestration
//!
//! This module provides the [`BackupPipeline`] struct, the entry point that
//! drives every stage of a run in strict order. The generation direction is
//!
//! `START -> ARCHIVE -> (ENCRYPT) -> TRANSFER -> CLEANUP_ARTIFACTS -> MANIFEST_UPDATE -> DONE`
//!
//! and retrieval mirrors it in reverse,
//!
//! `START -> DOWNLOAD -> (DECRYPT) -> DECOMPRESS -> DONE`,
//!
//! driven entirely by the manifest's recorded identifiers rather than a
//! location list. Encryption on retrieval is detected per artifact from the
//! `.enc` suffix of its remote identifier; there is no flag for it.
//!
//! ## Batching and failure
//!
//! Each stage processes every location before the next stage begins. The
//! first failure aborts the run at that stage: no later stage executes and
//! the side effects of completed stages are not rolled back. In particular a
//! transfer failure leaves all local artifacts on disk for a manual retry,
//! and no manifest row is written unless the transfer stage completed for
//! every location. An encryption failure is the one case with chained
//! cleanup: partial ciphertext and the now-orphaned compressed artifacts
//! are removed before the run aborts, while source locations stay untouched.
//!
//! ## Cancellation
//!
//! A [`CancelToken`] shared with the caller is checked between locations in
//! the archive, encrypt, transfer, download and decrypt stages, where the
//! latency lives. Once the transfer stage has completed, the run is allowed
//! to finish cleanup and the manifest update so that confirmed uploads are
//! always recorded.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use offsite::config::Credentials;
//! use offsite::pipeline::BackupPipeline;
//! use offsite::transfer::DirStore;
//! use offsite::types::BackupOptions;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::from_env()?;
//! let store = DirStore::new("/mnt/offsite")?;
//! let pipeline = BackupPipeline::new(&store, &credentials);
//!
//! let locations = vec![PathBuf::from("/home/me/notes.txt")];
//! let report = pipeline.run(&locations, &BackupOptions::default())?;
//! println!("uploaded {} artifact(s)", report.uploaded);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::archive;
use crate::config::Credentials;
use crate::crypto::{self, ENCRYPTED_SUFFIX};
use crate::error::{OffsiteError, Result};
use crate::manifest::{ManifestEntry, ManifestStore};
use crate::transfer::BlobStore;
use crate::types::{
    Artifact, BackupOptions, BackupReport, CancelToken, EncryptedArtifact, RetrievalReport,
    RetrieveOptions,
};
use crate::utils::{format_bytes, path_with_suffix};

/// Drives the backup and retrieval state machines
///
/// Holds the blob store and credentials for one run; options are passed per
/// call. All work is synchronous and strictly sequential, one location at a
/// time, one stage at a time.
pub struct BackupPipeline<'a> {
    /// Remote store artifacts are shipped to and fetched from
    store: &'a dyn BlobStore,
    /// Credentials resolved at startup, read-only for the run
    credentials: &'a Credentials,
    /// Cancellation signal checked between locations
    cancel: CancelToken,
}

impl<'a> BackupPipeline<'a> {
    /// Create a pipeline over a blob store and credentials
    pub fn new(store: &'a dyn BlobStore, credentials: &'a Credentials) -> Self {
        Self {
            store,
            credentials,
            cancel: CancelToken::new(),
        }
    }

    /// Attach a shared cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the generation direction over the given locations
    ///
    /// Archives every location, optionally encrypts the artifacts, uploads
    /// them, removes the confirmed-uploaded artifacts and merges this run's
    /// records into the manifest.
    ///
    /// # Arguments
    ///
    /// * `locations` - Files and directory roots to back up
    /// * `options` - Encryption toggle and manifest path
    ///
    /// # Errors
    ///
    /// The first stage failure aborts the run with its typed error; see the
    /// module docs for what is and is not cleaned up on each kind.
    #[instrument(skip(self, locations, options))]
    pub fn run(&self, locations: &[PathBuf], options: &BackupOptions) -> Result<BackupReport> {
        let start = Instant::now();
        let total_steps = if options.encrypt { 5 } else { 4 };
        let mut step = 0;
        info!(
            "Backing up {} location(s){}",
            locations.len(),
            if options.encrypt { " with encryption" } else { "" }
        );

        // ARCHIVE
        let artifacts = self.archive_stage(locations)?;
        step += 1;
        info!("Step {}/{} (archive): complete", step, total_steps);

        // ENCRYPT
        let encrypted = if options.encrypt {
            let sealed = match self.encrypt_stage(&artifacts) {
                Ok(sealed) => sealed,
                Err(e) => {
                    if matches!(e, OffsiteError::Encryption(_)) {
                        self.cleanup_failed_encrypt(&artifacts);
                    }
                    return Err(e);
                }
            };
            step += 1;
            info!("Step {}/{} (encrypt): complete", step, total_steps);
            Some(sealed)
        } else {
            None
        };

        // TRANSFER
        let uploads = match &encrypted {
            Some(sealed) => sealed
                .iter()
                .map(|e| UploadItem {
                    location: e.inner.source.to_string_lossy().into_owned(),
                    path: e.path.clone(),
                    source_size: e.inner.source_size,
                })
                .collect::<Vec<_>>(),
            None => artifacts
                .iter()
                .map(|a| UploadItem {
                    location: a.source.to_string_lossy().into_owned(),
                    path: a.path.clone(),
                    source_size: a.source_size,
                })
                .collect(),
        };
        let (new_entries, uploaded_bytes) = self.transfer_stage(&uploads)?;
        step += 1;
        info!("Step {}/{} (transfer): complete", step, total_steps);

        // CLEANUP_ARTIFACTS
        self.cleanup_stage(&artifacts, encrypted.as_deref())?;
        step += 1;
        info!("Step {}/{} (cleanup): complete", step, total_steps);

        // MANIFEST_UPDATE
        let touched: HashSet<String> = locations
            .iter()
            .map(|l| l.to_string_lossy().into_owned())
            .collect();
        let manifest_store = ManifestStore::new(&options.manifest_path);
        let merged = manifest_store
            .load_or_default()?
            .merge(new_entries, &touched);
        manifest_store.save(&merged)?;
        step += 1;
        info!("Step {}/{} (manifest update): complete", step, total_steps);

        let report = BackupReport {
            locations: locations.len(),
            uploaded: uploads.len(),
            source_bytes: artifacts.iter().map(|a| a.source_size).sum(),
            uploaded_bytes,
            encrypted: options.encrypt,
            duration_ms: start.elapsed().as_millis() as u64,
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            completed_at: Utc::now(),
        };
        info!(
            "Backup complete: {} location(s), {} uploaded ({}) in {} ms",
            report.locations,
            report.uploaded,
            format_bytes(report.uploaded_bytes),
            report.duration_ms
        );
        Ok(report)
    }

    /// Run the retrieval direction from the manifest
    ///
    /// Downloads every recorded artifact, decrypts the ones whose remote
    /// identifier carries the `.enc` suffix and decompresses the results
    /// into the download directory.
    ///
    /// # Errors
    ///
    /// Requires the manifest to exist; the first stage failure aborts the
    /// run with its typed error.
    #[instrument(skip(self, options))]
    pub fn retrieve(&self, options: &RetrieveOptions) -> Result<RetrievalReport> {
        let start = Instant::now();
        let manifest = ManifestStore::new(&options.manifest_path).load()?;
        if manifest.is_empty() {
            warn!("Manifest {:?} has no entries", options.manifest_path);
        }

        let any_encrypted = manifest
            .entries
            .iter()
            .any(|e| e.public_id.ends_with(ENCRYPTED_SUFFIX));
        let total_steps = if any_encrypted { 3 } else { 2 };
        let mut step = 0;
        info!(
            "Retrieving {} backup(s) into {:?}",
            manifest.len(),
            options.download_dir
        );

        // DOWNLOAD
        let mut downloaded = Vec::with_capacity(manifest.len());
        let mut downloaded_bytes = 0u64;
        for entry in &manifest.entries {
            self.cancel.check()?;
            let path = self.store.download(&entry.public_id, &options.download_dir)?;
            downloaded_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            downloaded.push(path);
        }
        step += 1;
        info!("Step {}/{} (download): complete", step, total_steps);

        // DECRYPT, detected per artifact from the suffix
        if any_encrypted {
            let mut decrypted = Vec::with_capacity(downloaded.len());
            for path in downloaded {
                self.cancel.check()?;
                if path
                    .file_name()
                    .map(|n| n.to_string_lossy().ends_with(ENCRYPTED_SUFFIX))
                    .unwrap_or(false)
                {
                    let plain = crypto::decrypt_file(&path, &self.credentials.password)?;
                    archive::discard(&path)?;
                    decrypted.push(plain);
                } else {
                    decrypted.push(path);
                }
            }
            downloaded = decrypted;
            step += 1;
            info!("Step {}/{} (decrypt): complete", step, total_steps);
        }

        // DECOMPRESS
        let mut restored = 0;
        for path in &downloaded {
            restored += archive::restore(path, &options.download_dir)?.len();
        }
        step += 1;
        info!("Step {}/{} (decompress): complete", step, total_steps);

        let report = RetrievalReport {
            entries: manifest.len(),
            downloaded_bytes,
            restored,
            duration_ms: start.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        };
        info!(
            "Retrieval complete: {} backup(s), {} restored file(s) ({}) in {} ms",
            report.entries,
            report.restored,
            format_bytes(report.downloaded_bytes),
            report.duration_ms
        );
        Ok(report)
    }

    /// ARCHIVE: compress every location into an artifact
    fn archive_stage(&self, locations: &[PathBuf]) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::with_capacity(locations.len());
        for location in locations {
            self.cancel.check()?;
            artifacts.push(archive::archive(location)?);
        }
        Ok(artifacts)
    }

    /// ENCRYPT: seal every artifact under the configured password
    fn encrypt_stage(&self, artifacts: &[Artifact]) -> Result<Vec<EncryptedArtifact>> {
        let mut sealed = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            self.cancel.check()?;
            let path = crypto::encrypt_file(&artifact.path, &self.credentials.password)?;
            sealed.push(EncryptedArtifact {
                path,
                inner: artifact.clone(),
            });
        }
        Ok(sealed)
    }

    /// TRANSFER: upload every artifact, collecting manifest entries
    ///
    /// Timestamps are taken when each upload is confirmed, not at archive
    /// time. Entries are held in memory; nothing reaches the manifest until
    /// the whole stage has succeeded.
    fn transfer_stage(&self, uploads: &[UploadItem]) -> Result<(Vec<ManifestEntry>, u64)> {
        let mut entries = Vec::with_capacity(uploads.len());
        let mut uploaded_bytes = 0u64;
        for item in uploads {
            self.cancel.check()?;
            let public_id = self.store.upload(&item.path)?;
            debug!("Resource URL: {}", self.store.resource_url(&public_id));
            uploaded_bytes += fs::metadata(&item.path).map(|m| m.len()).unwrap_or(0);
            entries.push(ManifestEntry {
                location: item.location.clone(),
                size: item.source_size,
                timestamp: Utc::now(),
                public_id,
            });
        }
        Ok((entries, uploaded_bytes))
    }

    /// CLEANUP_ARTIFACTS: remove every confirmed-uploaded artifact
    fn cleanup_stage(
        &self,
        artifacts: &[Artifact],
        encrypted: Option<&[EncryptedArtifact]>,
    ) -> Result<()> {
        for artifact in artifacts {
            archive::discard(&artifact.path)?;
        }
        if let Some(sealed) = encrypted {
            for enc in sealed {
                archive::discard(&enc.path)?;
            }
        }
        Ok(())
    }

    /// Best-effort removal of this run's artifacts after an encryption failure
    ///
    /// Removes any ciphertext already produced and the orphaned compressed
    /// artifacts. Source locations are never touched.
    fn cleanup_failed_encrypt(&self, artifacts: &[Artifact]) {
        warn!("Encryption failed, removing this run's artifacts");
        for artifact in artifacts {
            let enc_path = path_with_suffix(&artifact.path, ENCRYPTED_SUFFIX);
            if enc_path.exists() {
                if let Err(e) = fs::remove_file(&enc_path) {
                    warn!("Could not remove {:?}: {}", enc_path, e);
                }
            }
            if artifact.path.exists() {
                if let Err(e) = fs::remove_file(&artifact.path) {
                    warn!("Could not remove {:?}: {}", artifact.path, e);
                }
            }
        }
    }
}

/// One pending upload: the location it represents, the file to ship and the
/// source size recorded in its manifest entry
struct UploadItem {
    location: String,
    path: PathBuf,
    source_size: u64,
}

impl std::fmt::Debug for BackupPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupPipeline")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
