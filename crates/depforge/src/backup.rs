//! Installation backup (C7): atomic snapshot, restore, and cleanup of the
//! manifest and lock file.
//!
//! Backup paths are siblings of the originals (same directory, hence same
//! filesystem) so `restore` can rename over the live file atomically on
//! POSIX. Production and development installs each get their own
//! `BackupState`; on a dev failure after a successful prod install, only
//! the dev backup is restored.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use depforge_types::{BackupEntry, BackupState, PackageManager, PipelineError, Result};

use crate::manifest::MANIFEST_FILE;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A timestamped suffix, additionally disambiguated by a process-local
/// monotonic counter so two backups created within the same run can never
/// collide even if created in the same microsecond.
fn unique_suffix() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::SeqCst);
    format!("{}.{seq}.bak", Utc::now().format("%Y%m%d%H%M%S%6f"))
}

/// Synchronously snapshot the manifest and, if present, the lock file for
/// `manager`, to sibling paths. The copy is synchronous so the backup is
/// durable on disk before the installer is spawned.
pub fn create(project_root: &Path, manager: PackageManager) -> Result<BackupState> {
    let suffix = unique_suffix();

    let manifest_path = project_root.join(MANIFEST_FILE);
    let manifest_backup_path = sibling_with_suffix(&manifest_path, &suffix);
    copy_if_exists(&manifest_path, &manifest_backup_path)?;
    let manifest = BackupEntry {
        path: manifest_path,
        backup_path: manifest_backup_path,
    };

    let lock_path = project_root.join(manager.lock_file_name());
    let lock_file = if lock_path.is_file() {
        let lock_backup_path = sibling_with_suffix(&lock_path, &suffix);
        copy_if_exists(&lock_path, &lock_backup_path)?;
        Some(BackupEntry {
            path: lock_path,
            backup_path: lock_backup_path,
        })
    } else {
        None
    };

    Ok(BackupState { manifest, lock_file })
}

/// Restore the live manifest and lock file from `state`, atomically. Missing
/// backups are silently skipped so restore is safe even after a partial
/// crash; idempotent when called more than once.
pub fn restore(state: &BackupState) -> Result<()> {
    restore_entry(&state.manifest)?;
    if let Some(lock_entry) = &state.lock_file {
        restore_entry(lock_entry)?;
    }
    Ok(())
}

/// Delete the backup files after a successful install. Idempotent;
/// failures are non-fatal (logged by the caller via its `Reporter`, never
/// propagated as a hard error).
pub fn cleanup(state: &BackupState) {
    let _ = fs::remove_file(&state.manifest.backup_path);
    if let Some(lock_entry) = &state.lock_file {
        let _ = fs::remove_file(&lock_entry.backup_path);
    }
}

fn restore_entry(entry: &BackupEntry) -> Result<()> {
    if !entry.backup_path.is_file() {
        return Ok(());
    }
    fs::rename(&entry.backup_path, &entry.path)
        .map_err(|e| PipelineError::Backup(format!("failed to restore {}: {e}", entry.path.display())))?;
    Ok(())
}

fn copy_if_exists(path: &Path, backup_path: &Path) -> Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    fs::copy(path, backup_path)
        .map_err(|e| PipelineError::Backup(format!("failed to back up {}: {e}", path.display())))?;
    Ok(())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("backup");
    path.with_file_name(format!("{file_name}.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn create_and_restore_roundtrips_unmodified_manifest() {
        let dir = tempdir().expect("tempdir");
        let manifest_path = dir.path().join(MANIFEST_FILE);
        fs::write(&manifest_path, r#"{"dependencies":{}}"#).expect("write manifest");

        let state = create(dir.path(), PackageManager::Npm).expect("backup");
        fs::write(&manifest_path, "corrupted").expect("mutate");

        restore(&state).expect("restore");

        let restored = fs::read_to_string(&manifest_path).expect("read restored");
        assert_eq!(restored, r#"{"dependencies":{}}"#);
    }

    #[test]
    fn create_backs_up_lock_file_when_present() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "{}").expect("write manifest");
        fs::write(dir.path().join("package-lock.json"), "lockdata").expect("write lock");

        let state = create(dir.path(), PackageManager::Npm).expect("backup");
        assert!(state.lock_file.is_some());
        assert!(state.lock_file.unwrap().backup_path.is_file());
    }

    #[test]
    fn create_without_lock_file_leaves_it_none() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "{}").expect("write manifest");

        let state = create(dir.path(), PackageManager::Npm).expect("backup");
        assert!(state.lock_file.is_none());
    }

    #[test]
    fn restore_is_idempotent_with_missing_backups() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "{}").expect("write manifest");

        let state = create(dir.path(), PackageManager::Npm).expect("backup");
        restore(&state).expect("first restore");
        // Second restore: backup file is already gone (renamed away).
        restore(&state).expect("second restore is a no-op");
    }

    #[test]
    fn cleanup_called_twice_is_equivalent_to_once() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "{}").expect("write manifest");

        let state = create(dir.path(), PackageManager::Npm).expect("backup");
        cleanup(&state);
        cleanup(&state);
        assert!(!state.manifest.backup_path.exists());
    }

    #[test]
    fn two_backups_created_back_to_back_do_not_collide() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "{}").expect("write manifest");

        let first = create(dir.path(), PackageManager::Npm).expect("first backup");
        let second = create(dir.path(), PackageManager::Npm).expect("second backup");

        assert_ne!(first.manifest.backup_path, second.manifest.backup_path);
    }

    #[test]
    fn backup_paths_live_in_the_same_directory_as_originals() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "{}").expect("write manifest");

        let state = create(dir.path(), PackageManager::Npm).expect("backup");
        assert_eq!(state.manifest.backup_path.parent(), Some(dir.path()));
    }
}
