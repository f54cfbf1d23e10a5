//! Transfer stage: remote blob store implementations
//!
//! The pipeline talks to remote storage through the [`BlobStore`] trait:
//! upload an artifact and get back its remote identifier, download by
//! identifier, resolve an identifier to a URL. The identifier is derived
//! deterministically from the artifact's file name, so re-uploading the
//! same location overwrites the prior object instead of accumulating
//! orphans.
//!
//! Two implementations are provided: [`DirStore`] copies artifacts into a
//! local directory and is what the tests run against; [`CloudStore`] speaks
//! the signed multipart upload API of a media CDN. Both stream file bodies
//! instead of buffering them whole.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use reqwest::blocking::{multipart, Client};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::Credentials;
use crate::error::{OffsiteError, Result};

/// Default API endpoint for [`CloudStore`] uploads.
pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Default delivery host [`CloudStore`] resource URLs point at.
pub const DEFAULT_DELIVERY_BASE: &str = "https://res.cloudinary.com";

/// Remote object storage used by the transfer stage
///
/// Implementations must derive the returned identifier from the uploaded
/// file's name and overwrite any prior object under the same identifier.
pub trait BlobStore {
    /// Upload the file at `path`, returning its remote identifier
    fn upload(&self, path: &Path) -> Result<String>;

    /// Download the object named by `public_id` into `dest_dir`
    ///
    /// Returns the path of the downloaded file.
    fn download(&self, public_id: &str, dest_dir: &Path) -> Result<PathBuf>;

    /// Resolve a remote identifier to a fetchable URL
    fn resource_url(&self, public_id: &str) -> String;
}

/// The remote identifier for an artifact path, its file name
fn public_id_for(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| OffsiteError::transfer(format!("{:?} has no file name", path)))
}

/// Directory-backed blob store
///
/// Keeps objects as plain files under a root directory, keyed by their
/// public identifier. Useful for local backups onto mounted media and as
/// the store the test suite exercises the pipeline against.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Create a store rooted at `root`, creating the directory if missing
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            OffsiteError::transfer(format!("cannot create store root {:?}: {}", root, e))
        })?;
        Ok(Self { root })
    }

    /// Root directory objects are stored under
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobStore for DirStore {
    fn upload(&self, path: &Path) -> Result<String> {
        let public_id = public_id_for(path)?;
        let target = self.root.join(&public_id);

        let mut source = File::open(path)
            .map_err(|e| OffsiteError::transfer(format!("cannot open {:?}: {}", path, e)))?;
        let mut sink = File::create(&target)
            .map_err(|e| OffsiteError::transfer(format!("cannot create {:?}: {}", target, e)))?;
        let bytes = io::copy(&mut source, &mut sink)
            .map_err(|e| OffsiteError::transfer(format!("upload of {:?} failed: {}", path, e)))?;

        info!("Stored {:?} as {} ({} bytes)", path, public_id, bytes);
        Ok(public_id)
    }

    fn download(&self, public_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        let source_path = self.root.join(public_id);
        let dest = dest_dir.join(public_id);
        fs::create_dir_all(dest_dir).map_err(|e| {
            OffsiteError::transfer(format!("cannot create {:?}: {}", dest_dir, e))
        })?;

        let mut source = File::open(&source_path).map_err(|e| {
            OffsiteError::transfer(format!("no stored object {}: {}", public_id, e))
        })?;
        let mut sink = File::create(&dest)
            .map_err(|e| OffsiteError::transfer(format!("cannot create {:?}: {}", dest, e)))?;
        io::copy(&mut source, &mut sink)
            .map_err(|e| OffsiteError::transfer(format!("download of {} failed: {}", public_id, e)))?;

        debug!("Fetched {} to {:?}", public_id, dest);
        Ok(dest)
    }

    fn resource_url(&self, public_id: &str) -> String {
        format!("file://{}", self.root.join(public_id).display())
    }
}

/// Blob store speaking a signed media-CDN upload API
///
/// Uploads are authenticated multipart POSTs against the account's raw
/// upload endpoint; request parameters are signed with a SHA-256 digest of
/// the sorted parameter string and the API secret. Downloads fetch the
/// delivery URL and stream the body to disk.
pub struct CloudStore {
    client: Client,
    api_base: String,
    delivery_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudStore {
    /// Create a store for the account in `credentials`
    pub fn new(credentials: &Credentials) -> Result<Self> {
        // Large archives routinely outlive any fixed request timeout
        let client = Client::builder().timeout(None).build()?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            delivery_base: DEFAULT_DELIVERY_BASE.to_string(),
            cloud_name: credentials.cloud_name.clone(),
            api_key: credentials.api_key.clone(),
            api_secret: credentials.api_secret.clone(),
        })
    }

    /// Override the API and delivery endpoints
    pub fn with_endpoints(mut self, api_base: impl Into<String>, delivery_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.delivery_base = delivery_base.into();
        self
    }

    /// Sign sorted `key=value` parameters with the API secret
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by_key(|&(k, _)| k);
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl BlobStore for CloudStore {
    fn upload(&self, path: &Path) -> Result<String> {
        let public_id = public_id_for(path)?;
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("overwrite", "true"),
            ("public_id", &public_id),
            ("timestamp", &timestamp),
        ]);

        // Form::file streams the artifact from disk in chunks
        let form = multipart::Form::new()
            .file("file", path)
            .map_err(|e| OffsiteError::transfer(format!("cannot read {:?}: {}", path, e)))?
            .text("api_key", self.api_key.clone())
            .text("public_id", public_id.clone())
            .text("overwrite", "true")
            .text("timestamp", timestamp)
            .text("signature", signature);

        let url = format!("{}/{}/raw/upload", self.api_base, self.cloud_name);
        debug!("Uploading {:?} to {}", path, url);
        let response = self.client.post(&url).multipart(form).send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(OffsiteError::transfer(format!(
                "upload of {:?} rejected with {}: {}",
                path, status, body
            )));
        }

        // The store echoes the identifier it filed the object under
        let body: serde_json::Value = response.json()?;
        let remote_id = body
            .get("public_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(public_id);
        info!("Uploaded {:?} as {}", path, remote_id);
        Ok(remote_id)
    }

    fn download(&self, public_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        let url = self.resource_url(public_id);
        let dest = dest_dir.join(public_id);
        fs::create_dir_all(dest_dir).map_err(|e| {
            OffsiteError::transfer(format!("cannot create {:?}: {}", dest_dir, e))
        })?;

        debug!("Fetching {}", url);
        let mut response = self.client.get(&url).send()?.error_for_status()?;
        let mut sink = File::create(&dest)
            .map_err(|e| OffsiteError::transfer(format!("cannot create {:?}: {}", dest, e)))?;
        let bytes = io::copy(&mut response, &mut sink)
            .map_err(|e| OffsiteError::transfer(format!("download of {} failed: {}", public_id, e)))?;

        info!("Downloaded {} ({} bytes) to {:?}", public_id, bytes, dest);
        Ok(dest)
    }

    fn resource_url(&self, public_id: &str) -> String {
        format!(
            "{}/{}/raw/upload/{}",
            self.delivery_base, self.cloud_name, public_id
        )
    }
}
