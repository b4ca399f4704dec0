//! Integration tests for Cairn
//!
//! Full backup, restore, check and list cycles over generated trees.

use ::cairn::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

/// Test harness owning a repository and a source tree
pub struct CairnTestHarness {
    pub temp_dir: TempDir,
    pub repo: Repository,
    pub generator: FileGenerator,
}

impl CairnTestHarness {
    pub fn new() -> Self {
        Self::with_algorithm(HashAlgorithm::Sha256)
    }

    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let repo = RepositoryBuilder::new()
            .threads(4)
            .buffer_size(4096)
            .create(temp_dir.path().join("repo"), algorithm)
            .unwrap();
        Self {
            temp_dir,
            repo,
            generator: FileGenerator::new(42),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    /// Generate a nested project under `rel`
    pub fn generate_project(&mut self, rel: &str, config: ProjectConfig) -> anyhow::Result<PathBuf> {
        let root = self.path(rel);
        fs::create_dir_all(&root)?;
        for depth in 0..config.max_depth {
            for dir_idx in 0..config.dirs_per_level {
                let mut dir = root.clone();
                for level in 0..=depth {
                    dir = dir.join(format!("dir_{}_{}", level, dir_idx));
                }
                fs::create_dir_all(&dir)?;
                for file_idx in 0..config.files_per_dir {
                    let content = self.generator.content(config.max_file_size);
                    fs::write(dir.join(format!("file_{}.bin", file_idx)), content)?;
                }
            }
        }
        Ok(root)
    }

    pub fn blob_count(&self) -> usize {
        self.repo.store().list_blobs().unwrap().len()
    }
}

/// Project generation parameters
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub max_depth: usize,
    pub dirs_per_level: usize,
    pub files_per_dir: usize,
    pub max_file_size: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            dirs_per_level: 2,
            files_per_dir: 3,
            max_file_size: 8192,
        }
    }
}

/// Seeded random content
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn content(&mut self, max_size: usize) -> Vec<u8> {
        let size = self.rng.random_range(1..=max_size);
        let mut data = vec![0u8; size];
        self.rng.fill(&mut data[..]);
        data
    }
}

/// Relative path -> content for every regular file under `root`
pub fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Manifest names only carry whole seconds
fn wait_for_next_second() {
    std::thread::sleep(Duration::from_millis(1100));
}

#[test]
fn test_init_layout() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    Repository::create(&root, HashAlgorithm::Sha256).unwrap();

    assert!(root.join("backups").is_dir());
    let buckets: Vec<_> = fs::read_dir(root.join("files"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(buckets.len(), 256);
    for bucket in 0..=0xffu8 {
        assert!(root.join("files").join(format!("{:02x}", bucket)).is_dir());
    }

    let settings = fs::read_to_string(root.join("settings.toml")).unwrap();
    assert!(settings.contains("hashAlgorithm = \"sha256\""));
}

#[test]
fn test_single_file_scenario() {
    let mut harness = CairnTestHarness::new();
    let testdata = harness.path("testdata");
    fs::create_dir(&testdata).unwrap();
    let mut content = vec![0u8; 1024];
    harness.generator.rng.fill(&mut content[..]);
    fs::write(testdata.join("data.bin"), &content).unwrap();

    let summary = harness.repo.backup(&BackupOptions::new([&testdata])).unwrap();
    assert_eq!(summary.blobs_added, 1);

    let blobs = harness.repo.store().list_blobs().unwrap();
    assert_eq!(blobs.len(), 1);
    let expected = hex::encode(Sha256::digest(&content));
    let name = blobs[0].file_name().unwrap().to_str().unwrap().to_string();
    assert_eq!(name, format!("{}-1024", expected));
    assert_eq!(
        blobs[0].parent().unwrap().file_name().unwrap().to_str().unwrap(),
        &expected[..2]
    );

    let manifests: Vec<_> = fs::read_dir(harness.repo.store().backups_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(manifests.len(), 1);
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifests[0]).unwrap()).unwrap();
    let file = &json["dirs"][0]["files"][0];
    assert_eq!(file["size"], 1024);
    assert_eq!(file["hash"], expected.as_str());
}

#[test]
fn test_round_trip_preserves_tree() {
    let mut harness = CairnTestHarness::new();
    let project = harness
        .generate_project("project", ProjectConfig::default())
        .unwrap();
    let before = snapshot_tree(&project);
    info!("Generated {} files", before.len());

    let summary = harness.repo.backup(&BackupOptions::new([&project])).unwrap();
    assert_eq!(summary.files_found, before.len());
    assert!(summary.skipped.is_empty());

    let out = harness.path("restored");
    let result = harness.repo.restore(None, "", &out).unwrap();
    assert_eq!(result.files_restored, before.len());
    assert!(result.warnings.is_empty());

    let after = snapshot_tree(&out.join("project"));
    assert_eq!(before, after);
}

#[test]
fn test_dedup_across_runs() {
    let mut harness = CairnTestHarness::new();
    let project = harness
        .generate_project("project", ProjectConfig::default())
        .unwrap();

    let first = harness.repo.backup(&BackupOptions::new([&project])).unwrap();
    let blobs_after_first = harness.blob_count();
    assert_eq!(first.blobs_added, blobs_after_first);

    wait_for_next_second();
    let second = harness.repo.backup(&BackupOptions::new([&project])).unwrap();
    assert_eq!(second.blobs_added, 0);
    assert_eq!(second.bytes_added, 0);
    assert_eq!(harness.blob_count(), blobs_after_first);
    assert_ne!(first.manifest_path, second.manifest_path);

    let groups = harness.repo.list().unwrap();
    assert_eq!(groups[0].snapshots.len(), 2);
    assert!(groups[0].snapshots[0] < groups[0].snapshots[1]);
}

#[test]
fn test_named_backups_are_listed_separately() {
    let mut harness = CairnTestHarness::new();
    let docs = harness
        .generate_project("docs", ProjectConfig { max_depth: 1, ..Default::default() })
        .unwrap();
    let photos = harness
        .generate_project("photos", ProjectConfig { max_depth: 1, ..Default::default() })
        .unwrap();

    harness
        .repo
        .backup(&BackupOptions::new([&docs]).with_name("Docs"))
        .unwrap();
    harness
        .repo
        .backup(&BackupOptions::new([&photos]).with_name("archive"))
        .unwrap();
    harness.repo.backup(&BackupOptions::new([&docs])).unwrap();

    let groups = harness.repo.list().unwrap();
    let names: Vec<_> = groups.iter().map(|g| g.name.clone()).collect();
    assert_eq!(
        names,
        vec![None, Some("archive".to_string()), Some("Docs".to_string())]
    );
    assert!(groups.iter().all(|g| g.snapshots.len() == 1));

    let out = harness.path("out");
    harness.repo.restore(Some("archive"), "", &out).unwrap();
    assert!(out.join("photos").is_dir());
    assert!(!out.join("docs").exists());
}

#[test]
fn test_restore_by_date_prefix() {
    let mut harness = CairnTestHarness::new();
    let data = harness.path("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("v.txt"), b"first").unwrap();
    harness.repo.backup(&BackupOptions::new([&data])).unwrap();

    wait_for_next_second();
    fs::write(data.join("v.txt"), b"second").unwrap();
    let second = harness.repo.backup(&BackupOptions::new([&data])).unwrap();

    let full_name = second
        .manifest_path
        .file_stem()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let out = harness.path("out");
    harness.repo.restore(None, &full_name, &out).unwrap();
    assert_eq!(fs::read(out.join("data/v.txt")).unwrap(), b"second");

    // A shared prefix selects the oldest snapshot
    let out_old = harness.path("out_old");
    harness.repo.restore(None, "", &out_old).unwrap();
    assert_eq!(fs::read(out_old.join("data/v.txt")).unwrap(), b"first");
}

#[test]
fn test_every_algorithm_round_trips() {
    for algorithm in HashAlgorithm::ALL {
        let mut harness = CairnTestHarness::with_algorithm(algorithm);
        let project = harness
            .generate_project("p", ProjectConfig { max_depth: 2, ..Default::default() })
            .unwrap();
        harness.repo.backup(&BackupOptions::new([&project])).unwrap();

        for blob in harness.repo.store().list_blobs().unwrap() {
            let name = blob.file_name().unwrap().to_str().unwrap().to_string();
            let (hash, _) = name.split_once('-').unwrap();
            assert_eq!(hash.len(), algorithm.digest_len() * 2, "{}", algorithm);
        }
        assert!(harness.repo.check().unwrap().is_valid(), "{}", algorithm);

        let out = harness.path("out");
        harness.repo.restore(None, "", &out).unwrap();
        assert_eq!(snapshot_tree(&project), snapshot_tree(&out.join("p")));
    }
}

#[test]
fn test_reopen_uses_stored_algorithm() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    Repository::create(&root, HashAlgorithm::Sha512).unwrap();
    let data = temp.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("x"), b"x").unwrap();

    let repo = Repository::open(&root).unwrap();
    repo.backup(&BackupOptions::new([&data])).unwrap();
    let blob = &repo.store().list_blobs().unwrap()[0];
    let name = blob.file_name().unwrap().to_str().unwrap();
    assert_eq!(name.split_once('-').unwrap().0.len(), 128);
}

#[cfg(unix)]
#[test]
fn test_hidden_and_symlink_policies() {
    use cairn::utils::create_symlink;

    let harness = CairnTestHarness::new();
    let data = harness.path("data");
    let outside = harness.path("outside");
    fs::create_dir_all(data.join(".secret")).unwrap();
    fs::create_dir_all(&outside).unwrap();
    fs::write(data.join("visible.txt"), b"v").unwrap();
    fs::write(data.join(".hidden.txt"), b"h").unwrap();
    fs::write(data.join(".secret/key"), b"k").unwrap();
    fs::write(outside.join("target.txt"), b"t").unwrap();
    create_symlink(&outside.join("target.txt"), &data.join("link.txt")).unwrap();

    let summary = harness
        .repo
        .backup(&BackupOptions::new([&data]).with_omit_hidden(true))
        .unwrap();
    // Without following, the link is left out
    assert_eq!(summary.files_found, 1);

    let summary = harness
        .repo
        .backup(
            &BackupOptions::new([&data])
                .with_name("followed")
                .with_follow_symlinks(true),
        )
        .unwrap();
    assert_eq!(summary.files_found, 4);

    let out = harness.path("out");
    harness.repo.restore(Some("followed"), "", &out).unwrap();
    let link = out.join("data/link.txt");
    assert!(!fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read(link).unwrap(), b"t");
}
