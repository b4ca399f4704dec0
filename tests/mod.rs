//! Main test module for Cairn
//!
//! This module includes all test suites:
//! - Integration tests for complete backup, restore and check cycles
//! - Chaos tests for damaged repositories and unreadable inputs
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::cairn::*;
    use std::fs;
    use tempfile::TempDir;

    fn new_repo(temp: &TempDir) -> Repository {
        RepositoryBuilder::new()
            .threads(2)
            .buffer_size(1024)
            .create(temp.path().join("repo"), HashAlgorithm::Sha256)
            .unwrap()
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let empty = temp.path().join("empty");
        fs::create_dir(&empty).unwrap();

        let summary = repo.backup(&BackupOptions::new([&empty])).unwrap();
        assert_eq!(summary.files_found, 0);
        assert_eq!(summary.blobs_added, 0);

        let out = temp.path().join("out");
        let result = repo.restore(None, "", &out).unwrap();
        assert_eq!(result.dirs_created, 1);
        assert!(out.join("empty").is_dir());
        assert_eq!(fs::read_dir(out.join("empty")).unwrap().count(), 0);
    }

    #[test]
    fn test_special_filenames() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.multiple.dots.txt",
            "UPPERCASE.TXT",
            "ünïcödé.txt",
        ];
        for name in &special_names {
            fs::write(data.join(name), format!("content of {}", name)).unwrap();
        }

        repo.backup(&BackupOptions::new([&data])).unwrap();
        let out = temp.path().join("out");
        repo.restore(None, "", &out).unwrap();

        for name in &special_names {
            assert_eq!(
                fs::read_to_string(out.join("data").join(name)).unwrap(),
                format!("content of {}", name)
            );
        }
    }

    #[test]
    fn test_empty_and_identical_files() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let data = temp.path().join("data");
        fs::create_dir_all(data.join("nested")).unwrap();
        fs::write(data.join("empty.txt"), b"").unwrap();
        fs::write(data.join("a.txt"), b"same").unwrap();
        fs::write(data.join("nested/b.txt"), b"same").unwrap();

        let summary = repo.backup(&BackupOptions::new([&data])).unwrap();
        assert_eq!(summary.files_found, 3);
        assert_eq!(summary.blobs_added + summary.blobs_existing, 3);
        // "same" is stored once
        assert_eq!(repo.store().list_blobs().unwrap().len(), 2);

        let out = temp.path().join("out");
        repo.restore(None, "", &out).unwrap();
        assert_eq!(fs::read(out.join("data/empty.txt")).unwrap(), b"");
        assert_eq!(fs::read(out.join("data/nested/b.txt")).unwrap(), b"same");
    }

    #[test]
    fn test_single_file_input() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let file = temp.path().join("notes.txt");
        fs::write(&file, b"just a file").unwrap();

        repo.backup(&BackupOptions::new([&file])).unwrap();
        let out = temp.path().join("out");
        let result = repo.restore(None, "", &out).unwrap();
        assert_eq!(result.files_restored, 1);
        assert_eq!(result.dirs_created, 0);
        assert_eq!(fs::read(out.join("notes.txt")).unwrap(), b"just a file");
    }

    #[test]
    fn test_duplicate_root_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        for parent in ["one", "two"] {
            let dir = temp.path().join(parent).join("docs");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("f.txt"), parent).unwrap();
        }

        let result = repo.backup(&BackupOptions::new([
            temp.path().join("one/docs"),
            temp.path().join("two/docs"),
        ]));
        assert!(matches!(result, Err(CairnError::DuplicateName(ref n)) if n == "docs"));
        assert!(repo.list().unwrap()[0].snapshots.is_empty());
    }

    #[test]
    fn test_missing_input_path() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let result = repo.backup(&BackupOptions::new([temp.path().join("missing")]));
        assert!(matches!(result, Err(CairnError::InputNotFound(_))));
    }

    #[test]
    fn test_invalid_backup_names() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();

        for name in ["", "..", "a/b"] {
            let result = repo.backup(&BackupOptions::new([&data]).with_name(name));
            assert!(
                matches!(result, Err(CairnError::InvalidBackupName(_))),
                "name {:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_restore_unknown_backup() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let out = temp.path().join("out");
        assert!(matches!(
            repo.restore(Some("nobody"), "", &out),
            Err(CairnError::BackupNotFound(_))
        ));
        assert!(matches!(
            repo.restore(None, "1999", &out),
            Err(CairnError::BackupNotFound(_))
        ));
    }

    #[test]
    fn test_restore_refuses_existing_target() {
        let temp = TempDir::new().unwrap();
        let repo = new_repo(&temp);
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("f.txt"), b"x").unwrap();
        repo.backup(&BackupOptions::new([&data])).unwrap();

        let out = temp.path().join("out");
        fs::create_dir_all(out.join("data")).unwrap();
        assert!(matches!(
            repo.restore(None, "", &out),
            Err(CairnError::RestoreTargetExists(_))
        ));
    }

    #[test]
    fn test_init_twice_fails() {
        let temp = TempDir::new().unwrap();
        new_repo(&temp);
        assert!(matches!(
            Repository::create(temp.path().join("repo"), HashAlgorithm::Sha256),
            Err(CairnError::RepositoryNotEmpty(_))
        ));
    }
}
