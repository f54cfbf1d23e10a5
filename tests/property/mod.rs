//! Property-based testing for the backup pipeline's building blocks
//!
//! Uses proptest to verify archive and encryption round trips, manifest
//! merge behavior and location parsing across randomly generated inputs.

use chrono::{TimeZone, Utc};
use offsite::locations::parse_locations;
use offsite::manifest::{Manifest, ManifestEntry};
use offsite::{archive, crypto};
use proptest::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Generate file content across text, binary and repetitive shapes
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // Small text payloads
        "[a-zA-Z0-9 \n]{0,2000}".prop_map(|s| s.into_bytes()),
        // Binary data
        prop::collection::vec(any::<u8>(), 0..4096),
        // Repetitive patterns that compress well
        (any::<u8>(), 0..2048usize).prop_map(|(byte, count)| vec![byte; count]),
    ]
}

/// Generate printable passwords of varying length
fn password_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 !#$%@_-]{1,40}"
}

/// Generate manifest rows with distinct-looking locations
fn entry_strategy() -> impl Strategy<Value = ManifestEntry> {
    (
        "[a-z]{1,12}",
        0u64..1_000_000,
        0i64..2_000_000_000,
        "[a-z]{1,12}\\.(gz|tgz)",
    )
        .prop_map(|(name, size, secs, public_id)| ManifestEntry {
            location: format!("/data/{}", name),
            size,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            public_id,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_archive_file_round_trip(content in content_strategy()) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("payload.bin");
        fs::write(&source, &content).unwrap();

        let artifact = archive::archive(&source).unwrap();
        prop_assert_eq!(artifact.source_size, content.len() as u64);

        fs::remove_file(&source).unwrap();
        let restored = archive::restore(&artifact.path, temp.path()).unwrap();
        prop_assert_eq!(restored.len(), 1);
        prop_assert_eq!(fs::read(&source).unwrap(), content);
        // Restoration consumes the archive
        prop_assert!(!artifact.path.exists());
    }

    #[test]
    fn prop_archive_directory_round_trip(
        files in prop::collection::btree_map("[a-z]{1,10}\\.txt", content_strategy(), 1..6)
    ) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("bundle");
        fs::create_dir(&source).unwrap();
        for (name, content) in &files {
            fs::write(source.join(name), content).unwrap();
        }

        let artifact = archive::archive(&source).unwrap();
        let restore_dir = temp.path().join("restored");
        archive::restore(&artifact.path, &restore_dir).unwrap();

        for (name, content) in &files {
            prop_assert_eq!(
                &fs::read(restore_dir.join("bundle").join(name)).unwrap(),
                content
            );
        }
    }
}

proptest! {
    // Key derivation dominates the cost of each case, so keep these small
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_encrypt_decrypt_round_trip(
        content in content_strategy(),
        password in password_strategy(),
    ) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("artifact.gz");
        fs::write(&source, &content).unwrap();

        let sealed = crypto::encrypt_file(&source, &password).unwrap();
        prop_assert!(sealed.to_string_lossy().ends_with(".enc"));
        // Ciphertext always carries salt, nonce and tag overhead
        prop_assert!(fs::metadata(&sealed).unwrap().len() > content.len() as u64);

        fs::remove_file(&source).unwrap();
        let opened = crypto::decrypt_file(&sealed, &password).unwrap();
        prop_assert_eq!(opened, source.clone());
        prop_assert_eq!(fs::read(&source).unwrap(), content);
    }

    #[test]
    fn prop_wrong_password_rejected(
        content in content_strategy(),
        password in password_strategy(),
        other in password_strategy(),
    ) {
        prop_assume!(password != other);

        let temp = TempDir::new().unwrap();
        let source = temp.path().join("artifact.gz");
        fs::write(&source, &content).unwrap();

        let sealed = crypto::encrypt_file(&source, &password).unwrap();
        fs::remove_file(&source).unwrap();

        prop_assert!(crypto::decrypt_file(&sealed, &other).is_err());
        // No partial plaintext is left behind
        prop_assert!(!source.exists());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_merge_keeps_untouched_rows_and_appends_new(
        base in prop::collection::vec(entry_strategy(), 0..8),
        fresh in prop::collection::vec(entry_strategy(), 0..4),
    ) {
        // Treat every other base row as re-uploaded this run, plus the
        // fresh locations
        let touched: HashSet<String> = base
            .iter()
            .step_by(2)
            .map(|e| e.location.clone())
            .chain(fresh.iter().map(|e| e.location.clone()))
            .collect();
        let new_rows: Vec<ManifestEntry> = base
            .iter()
            .step_by(2)
            .cloned()
            .map(|mut e| {
                e.size += 1;
                e
            })
            .chain(fresh.iter().cloned())
            .collect();

        let manifest = Manifest {
            entries: base.clone(),
        };
        let merged = manifest.merge(new_rows.clone(), &touched);

        let kept: Vec<ManifestEntry> = base
            .iter()
            .filter(|e| !touched.contains(&e.location))
            .cloned()
            .collect();
        // Untouched rows survive unchanged and in order, new rows follow
        prop_assert_eq!(&merged.entries[..kept.len()], &kept[..]);
        prop_assert_eq!(&merged.entries[kept.len()..], &new_rows[..]);
    }

    #[test]
    fn prop_parse_keeps_nonblank_lines_in_order(
        names in prop::collection::vec("[a-z]{3,10}", 0..8),
        blanks in prop::collection::vec(prop_oneof![Just(""), Just("   "), Just("\t")], 0..8),
    ) {
        let mut lines: Vec<String> = names
            .iter()
            .map(|n| format!("  /backup-sources/{}  ", n))
            .collect();
        lines.extend(blanks.iter().map(|b| b.to_string()));
        let input = lines.join("\n");

        let expected: Vec<PathBuf> = names
            .iter()
            .map(|n| PathBuf::from(format!("/backup-sources/{}", n)))
            .collect();
        prop_assert_eq!(parse_locations(&input), expected);
    }
}
