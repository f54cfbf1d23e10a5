//! # Offsite - A personal backup pipeline
//!
//! A small library and CLI that archives filesystem locations, optionally
//! encrypts the archives, ships them to a remote blob store and records
//! every backup in a durable manifest that can later drive a full restore.
//!
//! ## Overview
//!
//! One backup run reads a list of locations (files or directory roots) and
//! pushes each through a fixed sequence of stages:
//!
//! - **Archive**: files become gzip copies (`.gz`), directories become
//!   gzip-compressed tars (`.tgz`) rooted under their own name
//! - **Encrypt** (optional): artifacts are sealed with AES-256-GCM under a
//!   PBKDF2-derived key, a fresh salt per file per run (`.enc`)
//! - **Transfer**: artifacts are uploaded; the remote identifier derives
//!   from the file name so re-uploads overwrite rather than accumulate
//! - **Cleanup**: confirmed-uploaded artifacts are removed from disk
//! - **Manifest update**: the run's records are merged into a CSV manifest,
//!   replacing rows for touched locations and preserving all others
//!
//! Retrieval reverses the process from the manifest alone: download,
//! decrypt where the stored name carries the `.enc` suffix, decompress.
//!
//! Each stage processes every location before the next begins, and the
//! first failure aborts the run at that stage with a typed error. Nothing
//! is retried and completed stages are not rolled back; local artifacts are
//! kept on a transfer failure so the upload can be redone by hand.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use offsite::{BackupOptions, BackupPipeline, Credentials, DirStore, RetrieveOptions};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Credentials come from the environment (CLOUD_NAME, API_KEY,
//! // API_SECRET, PASSWORD), typically populated from a .env file
//! let credentials = Credentials::from_env()?;
//! let store = DirStore::new("/mnt/offsite")?;
//!
//! // Back up two locations, encrypting the artifacts
//! let pipeline = BackupPipeline::new(&store, &credentials);
//! let report = pipeline.run(
//!     &[PathBuf::from("/home/me/notes.txt"), PathBuf::from("/home/me/photos")],
//!     &BackupOptions { encrypt: true, ..Default::default() },
//! )?;
//! println!("uploaded {} artifact(s)", report.uploaded);
//!
//! // Later, restore everything the manifest knows about
//! pipeline.retrieve(&RetrieveOptions::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Artifacts and suffixes
//!
//! The on-disk suffixes are a round-trip contract: `.gz` for compressed
//! files, `.tgz` for compressed directory trees, with `.enc` appended to
//! either when encrypted. Retrieval dispatches on these suffixes and needs
//! no other metadata.
//!
//! ### Manifest
//!
//! The manifest is a CSV table with the header
//! `location,size,timestamp,public_id`, exactly one row per location,
//! updated with a partial upsert (touched rows replaced, untouched rows
//! preserved byte for byte) and written atomically via a temp file rename.
//!
//! ### Blob stores
//!
//! Remote storage is pluggable behind the [`BlobStore`] trait. [`DirStore`]
//! keeps objects in a local directory; [`CloudStore`] speaks a signed
//! multipart HTTP upload API. Both stream file bodies.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, OffsiteError>`, with one variant per
//! stage (configuration, archive, encryption, transfer, manifest) plus
//! cancellation. Errors carry the offending location so a failed run can
//! be remediated by hand; nothing exits the process from library code.
//!
//! ## Module Organization
//!
//! - [`pipeline`]: run orchestration for both directions
//! - [`archive`]: compression and restoration of locations
//! - [`crypto`]: password-based sealing of artifacts
//! - [`transfer`]: blob store trait and implementations
//! - [`manifest`]: durable backup records
//! - [`locations`]: location-list parsing
//! - [`config`]: credential loading
//! - [`types`]: shared data structures
//! - [`error`]: error types and handling

// Public API modules
pub mod archive;
pub mod config;
pub mod crypto;
pub mod error;
pub mod locations;
pub mod manifest;
pub mod pipeline;
pub mod transfer;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use config::Credentials;
pub use error::{OffsiteError, Result};
pub use manifest::{Manifest, ManifestEntry, ManifestStore};
pub use pipeline::BackupPipeline;
pub use transfer::{BlobStore, CloudStore, DirStore};
pub use types::*;
