use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, Write};
use std::path::Path;

/// Exclusive advisory lock over the registry.
///
/// Every registry mutation holds this lock for its whole read-modify-write
/// cycle. The lock is tied to an open file description, so it serialises
/// threads of one process as well as separate processes. While held, the
/// lock file contains the holder's pid. Released (and emptied) on drop.
pub struct RegistryLock {
    lock_file: File,
}

impl RegistryLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, StoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(format!("{}: {e}", lock_path.display())))?;
        Self::held(file)
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Self::held(file).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn held(mut file: File) -> Result<Self, StoreError> {
        file.set_len(0)?;
        file.rewind()?;
        write!(file, "{}", std::process::id())?;
        Ok(Self { lock_file: file })
    }

    /// Pid recorded by the current holder, if the lock is held.
    pub fn holder(lock_path: &Path) -> Option<u32> {
        std::fs::read_to_string(lock_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = self.lock_file.set_len(0);
        let _ = self.lock_file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        {
            let _lock = RegistryLock::acquire(&lock_path).unwrap();
            assert!(lock_path.exists());
        }
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        let _lock = RegistryLock::acquire(&lock_path).unwrap();
        let result = RegistryLock::try_acquire(&lock_path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        {
            let _lock = RegistryLock::acquire(&lock_path).unwrap();
        }

        let lock2 = RegistryLock::try_acquire(&lock_path).unwrap();
        assert!(lock2.is_some());
    }

    #[test]
    fn holder_pid_recorded_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        {
            let _lock = RegistryLock::acquire(&lock_path).unwrap();
            assert_eq!(RegistryLock::holder(&lock_path), Some(std::process::id()));
        }
        assert_eq!(RegistryLock::holder(&lock_path), None);
    }

    #[test]
    fn acquire_creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("nested").join("cfg").join(".lock");
        let _lock = RegistryLock::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
    }
}
