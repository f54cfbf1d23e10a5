//! Integration tests for the offsite backup pipeline
//!
//! Exercises complete generation and retrieval runs against a directory
//! store: archiving, encryption, transfer, manifest bookkeeping and
//! restoration of real file trees.

use offsite::{
    BackupOptions, BackupPipeline, Credentials, DirStore, Manifest, ManifestStore, OffsiteError,
    RetrieveOptions,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test harness wiring a pipeline to a directory store
///
/// Sources, the store root and the working area (manifest, downloads) each
/// live in their own temporary directory so a test can assert that a stage
/// touched exactly the trees it should have.
pub struct PipelineHarness {
    pub sources: TempDir,
    pub store_root: TempDir,
    pub work: TempDir,
    pub credentials: Credentials,
}

impl PipelineHarness {
    pub fn new() -> Self {
        Self {
            sources: TempDir::new().unwrap(),
            store_root: TempDir::new().unwrap(),
            work: TempDir::new().unwrap(),
            credentials: test_credentials(),
        }
    }

    /// Create a source file and return its absolute path
    pub fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.sources.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// Create a source directory from (relative path, content) pairs
    pub fn create_tree(&self, name: &str, files: &[(&str, &[u8])]) -> anyhow::Result<PathBuf> {
        let root = self.sources.path().join(name);
        fs::create_dir_all(&root)?;
        for (rel, content) in files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
        }
        Ok(root)
    }

    pub fn store(&self) -> DirStore {
        DirStore::new(self.store_root.path().join("blobs")).unwrap()
    }

    /// Path a blob with the given name lands at inside the store
    pub fn blob(&self, name: &str) -> PathBuf {
        self.store_root.path().join("blobs").join(name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.work.path().join("reports").join("summary.csv")
    }

    pub fn backup_options(&self, encrypt: bool) -> BackupOptions {
        BackupOptions {
            encrypt,
            manifest_path: self.manifest_path(),
        }
    }

    pub fn retrieve_options(&self) -> RetrieveOptions {
        RetrieveOptions {
            manifest_path: self.manifest_path(),
            download_dir: self.work.path().join("backups"),
        }
    }

    pub fn load_manifest(&self) -> Manifest {
        ManifestStore::new(self.manifest_path()).load().unwrap()
    }
}

fn test_credentials() -> Credentials {
    Credentials {
        cloud_name: "demo".to_string(),
        api_key: "key".to_string(),
        api_secret: "secret".to_string(),
        password: "correct horse battery staple".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_backup_uploads_file_and_directory() {
        let h = PipelineHarness::new();
        let file = h.create_file("notes.txt", b"meeting notes");
        let dir = h
            .create_tree(
                "photos",
                &[
                    ("summer/beach.jpg", b"pretend jpeg bytes".as_slice()),
                    ("winter.jpg", b"more pretend bytes".as_slice()),
                ],
            )
            .unwrap();

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        let report = pipeline
            .run(&[file.clone(), dir.clone()], &h.backup_options(false))
            .unwrap();

        assert_eq!(report.locations, 2);
        assert_eq!(report.uploaded, 2);
        assert!(!report.encrypted);
        assert_eq!(report.source_bytes, 13 + 18 + 18);
        assert!(!report.hostname.is_empty());

        // Blobs landed in the store under their file names
        assert!(h.blob("notes.txt.gz").exists());
        assert!(h.blob("photos.tgz").exists());
        let blob_bytes = fs::metadata(h.blob("notes.txt.gz")).unwrap().len()
            + fs::metadata(h.blob("photos.tgz")).unwrap().len();
        assert_eq!(report.uploaded_bytes, blob_bytes);

        // Local artifacts were cleaned up, sources untouched
        assert!(!h.sources.path().join("notes.txt.gz").exists());
        assert!(!h.sources.path().join("photos.tgz").exists());
        assert!(file.exists());
        assert!(dir.join("summer").join("beach.jpg").exists());

        let manifest = h.load_manifest();
        assert_eq!(manifest.len(), 2);
        let row = manifest.get(&file.to_string_lossy()).unwrap();
        assert_eq!(row.size, 13);
        assert_eq!(row.public_id, "notes.txt.gz");
        let row = manifest.get(&dir.to_string_lossy()).unwrap();
        assert_eq!(row.size, 36);
        assert_eq!(row.public_id, "photos.tgz");
    }

    #[test]
    fn test_second_run_preserves_untouched_rows() {
        let h = PipelineHarness::new();
        let first = h.create_file("first.txt", b"one");
        let second = h.create_file("second.txt", b"two plus");

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);

        pipeline
            .run(&[first.clone()], &h.backup_options(false))
            .unwrap();
        let original_row = h
            .load_manifest()
            .get(&first.to_string_lossy())
            .cloned()
            .unwrap();

        pipeline
            .run(&[second.clone()], &h.backup_options(false))
            .unwrap();

        let manifest = h.load_manifest();
        assert_eq!(manifest.len(), 2);
        // The first row survives the second run byte for byte
        assert_eq!(manifest.get(&first.to_string_lossy()), Some(&original_row));
        assert!(manifest.get(&second.to_string_lossy()).is_some());
    }

    #[test]
    fn test_reupload_same_location_keeps_single_row() {
        let h = PipelineHarness::new();
        let file = h.create_file("journal.txt", b"day one");

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);

        pipeline
            .run(&[file.clone()], &h.backup_options(false))
            .unwrap();
        let first_row = h
            .load_manifest()
            .get(&file.to_string_lossy())
            .cloned()
            .unwrap();

        fs::write(&file, b"day one\nday two").unwrap();
        pipeline
            .run(&[file.clone()], &h.backup_options(false))
            .unwrap();

        let manifest = h.load_manifest();
        assert_eq!(manifest.len(), 1);
        let second_row = manifest.get(&file.to_string_lossy()).unwrap();
        assert_eq!(second_row.size, 15);
        assert_eq!(second_row.public_id, first_row.public_id);
        assert!(second_row.timestamp >= first_row.timestamp);
    }

    #[test]
    #[traced_test]
    fn test_encrypted_backup_and_retrieval_round_trip() {
        let h = PipelineHarness::new();
        let file = h.create_file("secrets.txt", b"the vault combination is 7-21-8");

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        let report = pipeline
            .run(&[file.clone()], &h.backup_options(true))
            .unwrap();

        assert!(report.encrypted);
        assert!(h.blob("secrets.txt.gz.enc").exists());
        assert!(!h.blob("secrets.txt.gz").exists());
        // Neither the compressed nor the encrypted artifact is left behind
        assert!(!h.sources.path().join("secrets.txt.gz").exists());
        assert!(!h.sources.path().join("secrets.txt.gz.enc").exists());

        let row = h
            .load_manifest()
            .get(&file.to_string_lossy())
            .cloned()
            .unwrap();
        assert_eq!(row.public_id, "secrets.txt.gz.enc");

        let options = h.retrieve_options();
        let retrieval = pipeline.retrieve(&options).unwrap();
        assert_eq!(retrieval.entries, 1);
        assert_eq!(retrieval.restored, 1);

        let restored = options.download_dir.join("secrets.txt");
        assert_eq!(
            fs::read(&restored).unwrap(),
            b"the vault combination is 7-21-8"
        );
        // Both intermediate downloads were consumed during restoration
        assert!(!options.download_dir.join("secrets.txt.gz.enc").exists());
        assert!(!options.download_dir.join("secrets.txt.gz").exists());
    }

    #[test]
    fn test_retrieval_restores_directory_tree() {
        let h = PipelineHarness::new();
        let dir = h
            .create_tree(
                "projects",
                &[
                    ("app/src/main.rs", b"fn main() {}".as_slice()),
                    ("app/Cargo.toml", b"[package]".as_slice()),
                    ("README.md", b"# projects".as_slice()),
                ],
            )
            .unwrap();

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        pipeline
            .run(&[dir.clone()], &h.backup_options(false))
            .unwrap();

        let options = h.retrieve_options();
        let retrieval = pipeline.retrieve(&options).unwrap();
        assert_eq!(retrieval.entries, 1);

        let root = options.download_dir.join("projects");
        assert_eq!(
            fs::read(root.join("app").join("src").join("main.rs")).unwrap(),
            b"fn main() {}"
        );
        assert_eq!(fs::read(root.join("README.md")).unwrap(), b"# projects");
        assert!(!options.download_dir.join("projects.tgz").exists());
    }

    #[test]
    fn test_missing_location_aborts_before_any_upload() {
        let h = PipelineHarness::new();
        let good = h.create_file("present.txt", b"here");
        let missing = h.sources.path().join("not-here.txt");

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        let err = pipeline
            .run(&[good.clone(), missing], &h.backup_options(false))
            .unwrap_err();

        assert!(matches!(err, OffsiteError::Archive { .. }));
        // The transfer stage never ran, so the store stayed empty and no
        // manifest was written
        assert!(!h.blob("present.txt.gz").exists());
        assert!(!h.manifest_path().exists());
        // The artifact archived before the failure is kept for inspection
        assert!(h.sources.path().join("present.txt.gz").exists());
    }

    #[test]
    fn test_failed_run_leaves_existing_manifest_alone() {
        let h = PipelineHarness::new();
        let file = h.create_file("stable.txt", b"recorded");

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        pipeline
            .run(&[file.clone()], &h.backup_options(false))
            .unwrap();
        let before = h.load_manifest();

        let missing = h.sources.path().join("ghost.txt");
        pipeline
            .run(&[missing], &h.backup_options(false))
            .unwrap_err();

        assert_eq!(h.load_manifest(), before);
    }
}
