//! Main test module for the offsite backup pipeline
//!
//! This module includes all test suites:
//! - Integration tests for complete generation and retrieval runs
//! - Property-based tests for round-trip and merge invariants
//! - Edge case tests for unusual location shapes

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use crate::integration::PipelineHarness;
    use offsite::BackupPipeline;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_empty_file_backs_up_and_restores() {
        let h = PipelineHarness::new();
        let file = h.create_file("empty.dat", b"");

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        let report = pipeline
            .run(&[file.clone()], &h.backup_options(false))
            .unwrap();

        assert_eq!(report.source_bytes, 0);
        assert!(h.blob("empty.dat.gz").exists());
        let row = h.load_manifest().get(&file.to_string_lossy()).cloned().unwrap();
        assert_eq!(row.size, 0);

        let options = h.retrieve_options();
        pipeline.retrieve(&options).unwrap();
        assert_eq!(fs::read(options.download_dir.join("empty.dat")).unwrap(), b"");
    }

    #[test]
    fn test_dotted_directory_name_keeps_full_name() {
        let h = PipelineHarness::new();
        let dir = h
            .create_tree("photos.2024", &[("jan.jpg", b"winter".as_slice())])
            .unwrap();

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        pipeline
            .run(&[dir.clone()], &h.backup_options(false))
            .unwrap();

        // The archive suffix is appended, never substituted for a
        // perceived extension
        assert!(h.blob("photos.2024.tgz").exists());
        assert_eq!(
            h.load_manifest()
                .get(&dir.to_string_lossy())
                .unwrap()
                .public_id,
            "photos.2024.tgz"
        );
    }

    #[test]
    fn test_trailing_separator_location_names_artifact_cleanly() {
        let h = PipelineHarness::new();
        let dir = h
            .create_tree("music", &[("track.mp3", b"audio".as_slice())])
            .unwrap();
        let with_slash = PathBuf::from(format!("{}/", dir.display()));

        let store = h.store();
        let pipeline = BackupPipeline::new(&store, &h.credentials);
        pipeline
            .run(&[with_slash.clone()], &h.backup_options(false))
            .unwrap();

        assert!(h.blob("music.tgz").exists());
        // The manifest keeps the location exactly as it was configured
        assert!(h
            .load_manifest()
            .get(&with_slash.to_string_lossy())
            .is_some());
    }
}
