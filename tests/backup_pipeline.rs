use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use strongbox::backup::{BackupEngine, BackupKind, BackupOptions, MANIFEST_FILE};
use strongbox::crypto::KeyManager;
use strongbox::fs::DirectoryWalker;
use strongbox::integrity::{checksum_file, files_identical};
use tempfile::tempdir;

fn write_project(dir: &Path) {
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("a.txt"), b"hello").unwrap();
    fs::write(dir.join("sub").join("b.txt"), b"world").unwrap();
}

fn relative_files(root: &Path) -> Vec<String> {
    DirectoryWalker::new(root)
        .map(|entry| entry.unwrap())
        .filter(|entry| !entry.is_dir)
        .map(|entry| entry.relative_path.to_string_lossy().replace('\\', "/"))
        .collect()
}

fn age(path: &Path, by: Duration) {
    let when = SystemTime::now() - by;
    File::open(path).unwrap().set_modified(when).unwrap();
}

#[test]
fn full_backup_and_restore_round_trip() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("proj_src");
    write_project(&source);
    let engine = BackupEngine::new(dir.path().join("backups"));

    let summary = engine.full_backup("proj", &source).unwrap();
    assert_eq!(summary.kind(), BackupKind::Full);
    assert_eq!(summary.file_count, 2);
    assert_eq!(summary.total_bytes, 10);

    let dir_name = summary.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(dir_name.starts_with("proj_"));
    assert_eq!(dir_name.len(), "proj_YYYYMMDD_HHMMSS".len());

    let manifest = fs::read_to_string(summary.path.join(MANIFEST_FILE)).unwrap();
    assert!(manifest.contains("File Count: 2"));
    assert!(manifest.contains("Size: 10 bytes"));
    assert!(manifest.contains("Backup Type: Full"));
    assert!(manifest.contains(&format!("Checksum: {}", summary.checksum)));

    let restored = dir.path().join("restored");
    let result = engine.restore("proj", &restored).unwrap();
    assert_eq!(result.file_count, 2);
    assert_eq!(result.checksum_verified(), Some(true));
    assert!(result.warnings.is_empty());

    assert_eq!(relative_files(&restored), vec!["a.txt", "sub/b.txt"]);
    assert!(!restored.join(MANIFEST_FILE).exists());
    assert!(files_identical(&source.join("a.txt"), &restored.join("a.txt")).unwrap());
    assert_eq!(fs::read(restored.join("sub/b.txt")).unwrap(), b"world");
}

#[test]
fn incremental_contains_only_changes() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("src");
    write_project(&source);
    fs::create_dir_all(source.join("empty")).unwrap();
    for file in ["a.txt", "sub/b.txt"] {
        age(&source.join(file), Duration::from_secs(3600));
    }
    let engine = BackupEngine::new(dir.path().join("backups"));

    let full = engine.full_backup("proj", &source).unwrap();

    fs::write(source.join("a.txt"), b"hello again").unwrap();
    File::open(source.join("a.txt"))
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    fs::write(source.join("sub").join("c.txt"), b"new").unwrap();

    let inc = engine.incremental_backup("proj", &source).unwrap();
    assert_eq!(inc.kind(), BackupKind::Incremental);
    assert_eq!(inc.based_on, Some(full.created));
    assert_eq!(inc.file_count, 2);
    assert_eq!(inc.total_bytes, 14);

    assert_eq!(relative_files(&inc.path), vec!["a.txt", "backup_info.txt", "sub/c.txt"]);
    assert!(inc.path.join("empty").is_dir());

    let manifest = fs::read_to_string(inc.path.join(MANIFEST_FILE)).unwrap();
    assert!(manifest.contains("Backup Type: Incremental"));
    assert!(manifest.contains("Based on backup from: "));
}

#[test]
fn encrypted_compressed_backup_restores_plaintext() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("src");
    write_project(&source);
    let key = KeyManager::new(dir.path().join("keys/master.key"))
        .ensure()
        .unwrap();
    let options = BackupOptions::plain().compressed(true).encrypted(key);
    let engine = BackupEngine::new(dir.path().join("backups")).with_options(options);

    let summary = engine.full_backup("secret", &source).unwrap();
    assert_eq!(summary.total_bytes, 10);
    assert_ne!(fs::read(summary.path.join("a.txt")).unwrap(), b"hello");

    let validation = engine.verify_backup(&summary.path).unwrap();
    assert!(validation.is_valid());

    let restored = dir.path().join("restored");
    let result = engine.restore("secret", &restored).unwrap();
    assert_eq!(result.checksum_verified(), Some(true));
    assert_eq!(
        checksum_file(&restored.join("a.txt")).unwrap(),
        checksum_file(&source.join("a.txt")).unwrap()
    );

    let keyless = BackupEngine::new(dir.path().join("backups"));
    let err = keyless
        .restore("secret", &dir.path().join("other"))
        .unwrap_err();
    assert_eq!(err.status().code(), -4);
}

#[test]
fn retention_by_age() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("src");
    write_project(&source);
    let engine = BackupEngine::new(dir.path().join("backups"));

    let first = engine.full_backup("proj", &source).unwrap();
    let second = engine.full_backup("proj", &source).unwrap();
    age(&first.path, Duration::from_secs(60));
    age(&second.path, Duration::from_secs(60));

    assert!(engine.cleanup_old_backups(3650).unwrap().is_empty());
    assert_eq!(engine.list_backups().unwrap().len(), 2);

    let mut deleted = engine.cleanup_old_backups(0).unwrap();
    deleted.sort();
    let mut expected = vec![first.path, second.path];
    expected.sort();
    assert_eq!(deleted, expected);
    assert!(engine.list_backups().unwrap().is_empty());
}

#[test]
fn single_file_backup_round_trip() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("notes.txt");
    fs::write(&source, b"remember the milk").unwrap();
    let engine = BackupEngine::new(dir.path().join("backups"));

    let summary = engine.backup_file(&source, "notes").unwrap();
    assert!(summary.meta_path.exists());
    assert_eq!(summary.bytes, 17);

    let restored = dir.path().join("out").join("notes.txt");
    let result = engine.restore_file(&summary.path, &restored).unwrap();
    assert_eq!(result.checksum_verified(), Some(true));
    assert_eq!(fs::read(&restored).unwrap(), b"remember the milk");
}
