//! Property-based testing for Cairn
//!
//! Uses proptest to verify invariants across randomly generated manifests,
//! contents and file trees.

use ::cairn::hasher::{parse_blob_name, Hasher};
use ::cairn::manifest::{read_manifest, write_manifest};
use ::cairn::store::blob_path;
use ::cairn::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Files of one directory level; names are unique by construction
fn files_strategy() -> impl Strategy<Value = Vec<FileEntry>> {
    prop::collection::btree_map(
        "f_[a-z0-9]{1,8}",
        (any::<u64>(), prop::collection::vec(any::<u8>(), 1..64)),
        0..5,
    )
    .prop_map(|files| {
        files
            .into_iter()
            .map(|(name, (size, hash))| FileEntry {
                name,
                size,
                hash,
                source_path: None,
            })
            .collect()
    })
}

/// `(files, dirs)` of one level, nested up to three deep
fn level_strategy() -> impl Strategy<Value = (Vec<FileEntry>, Vec<DirEntry>)> {
    let leaf = files_strategy().prop_map(|files| (files, Vec::new()));
    leaf.prop_recursive(3, 32, 4, |inner| {
        (
            files_strategy(),
            prop::collection::btree_map("d_[a-z0-9]{1,8}", inner, 0..4),
        )
            .prop_map(|(files, dirs)| {
                let dirs = dirs
                    .into_iter()
                    .map(|(name, (files, dirs))| DirEntry { name, dirs, files })
                    .collect();
                (files, dirs)
            })
    })
}

fn manifest_strategy() -> impl Strategy<Value = Manifest> {
    level_strategy().prop_map(|(files, dirs)| Manifest {
        version: FORMAT_VERSION.to_string(),
        dirs,
        files,
    })
}

/// Small trees of `relative path -> content`
fn tree_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        "(a|b)/[a-z]{1,6}\\.txt",
        prop::collection::vec(any::<u8>(), 0..2048),
        1..12,
    )
}

fn write_tree(root: &Path, tree: &BTreeMap<String, Vec<u8>>) {
    for (rel, content) in tree {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_manifest_round_trip(manifest in manifest_strategy()) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("backups").join("2024-01-01_00-00-00.json");
        write_manifest(&path, &manifest).unwrap();
        let read = read_manifest(&path).unwrap();
        prop_assert_eq!(read, manifest);
    }

    #[test]
    fn prop_blob_path_depends_only_on_hash_and_size(
        hash in prop::collection::vec(any::<u8>(), 1..64),
        size in any::<u64>(),
    ) {
        let files = Path::new("/repo/files");
        let first = blob_path(files, &hash, size);
        prop_assert_eq!(&first, &blob_path(files, &hash, size));

        let hex = hex::encode(&hash);
        prop_assert_eq!(first.parent().unwrap(), files.join(&hex[..2]));

        let name = first.file_name().unwrap().to_str().unwrap();
        prop_assert_eq!(parse_blob_name(name), Some((hash.clone(), size)));
    }

    #[test]
    fn prop_digest_ignores_buffer_size(
        content in prop::collection::vec(any::<u8>(), 0..8192),
        small in 1usize..600,
        large in 600usize..10_000,
    ) {
        for algorithm in HashAlgorithm::ALL {
            let a = Hasher::new(algorithm, small).hash_reader(&mut content.as_slice()).unwrap();
            let b = Hasher::new(algorithm, large).hash_reader(&mut content.as_slice()).unwrap();
            prop_assert_eq!(a.len(), algorithm.digest_len());
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn prop_format_version_display_parses_back(
        major in 0u32..100,
        minor in 0u32..100,
        patch in 0u32..100,
    ) {
        let version = FormatVersion { major, minor, patch };
        let parsed: FormatVersion = version.to_string().parse().unwrap();
        prop_assert_eq!(parsed, version);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_backup_restore_round_trip(tree in tree_strategy()) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write_tree(&source, &tree);

        let repo = RepositoryBuilder::new()
            .threads(3)
            .buffer_size(512)
            .create(temp.path().join("repo"), HashAlgorithm::Sha256)
            .unwrap();
        let summary = repo.backup(&BackupOptions::new([&source])).unwrap();
        prop_assert_eq!(summary.files_found, tree.len());

        let out = temp.path().join("out");
        repo.restore(None, "", &out).unwrap();
        for (rel, content) in &tree {
            prop_assert_eq!(&fs::read(out.join("source").join(rel)).unwrap(), content);
        }
        prop_assert!(repo.check().unwrap().is_valid());
    }

    #[test]
    fn prop_same_content_same_blob(
        content in prop::collection::vec(any::<u8>(), 0..4096),
        first in "[a-z]{1,8}",
        second in "[A-Z]{1,8}",
    ) {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("one").join(&first);
        let b = temp.path().join("two").join("nested").join(&second);
        fs::create_dir_all(a.parent().unwrap()).unwrap();
        fs::create_dir_all(b.parent().unwrap()).unwrap();
        fs::write(&a, &content).unwrap();
        fs::write(&b, &content).unwrap();

        let mut hasher = Hasher::new(HashAlgorithm::Sha256, 1024);
        let hash_a = hasher.hash_path(&a).unwrap();
        let hash_b = hasher.hash_path(&b).unwrap();
        prop_assert_eq!(&hash_a, &hash_b);

        let files = temp.path().join("files");
        let size = content.len() as u64;
        prop_assert_eq!(blob_path(&files, &hash_a, size), blob_path(&files, &hash_b, size));
    }
}
