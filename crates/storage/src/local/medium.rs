use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fd_lock::RwLock;
use thiserror::Error;

use crate::repository::StorageError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MediumError {
    #[error("medium unavailable")]
    Unavailable,
    #[error("medium I/O error: {0}")]
    Io(String),
}

impl From<MediumError> for StorageError {
    fn from(err: MediumError) -> Self {
        match err {
            MediumError::Unavailable => StorageError::Unavailable,
            MediumError::Io(msg) => StorageError::Connection(msg),
        }
    }
}

impl From<io::Error> for MediumError {
    fn from(err: io::Error) -> Self {
        MediumError::Io(err.to_string())
    }
}

/// Synchronous string key-value medium backing the local store.
///
/// Mirrors what a browser-profile style storage offers: whole values are
/// read and replaced per key, and the medium may be switched off entirely.
pub trait KeyValueMedium: Send + Sync {
    fn is_available(&self) -> bool;

    /// # Errors
    ///
    /// Returns `MediumError` if the medium cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, MediumError>;

    /// # Errors
    ///
    /// Returns `MediumError` if the medium cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), MediumError>;

    /// Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `MediumError` if the medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), MediumError>;

    /// Read-modify-write of one key, atomic across every handle onto the same
    /// medium. `f` sees the current value and returns the replacement, or
    /// `None` to leave the value as it is.
    ///
    /// # Errors
    ///
    /// Returns `MediumError` if the medium cannot be read or written.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<(), MediumError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Process-local medium. Clones share the same contents, which makes it handy
/// for simulating several handles onto one profile.
#[derive(Clone, Default)]
pub struct MemoryMedium {
    values: Arc<Mutex<HashMap<String, String>>>,
    disabled: Arc<AtomicBool>,
}

impl MemoryMedium {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A medium that reports itself unavailable, like storage turned off by
    /// the user.
    #[must_use]
    pub fn disabled() -> Self {
        let medium = Self::default();
        medium.set_available(false);
        medium
    }

    pub fn set_available(&self, available: bool) {
        self.disabled.store(!available, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, MediumError> {
        if !self.is_available() {
            return Err(MediumError::Unavailable);
        }
        self.values
            .lock()
            .map_err(|e| MediumError::Io(e.to_string()))
    }
}

impl KeyValueMedium for MemoryMedium {
    fn is_available(&self) -> bool {
        !self.disabled.load(Ordering::SeqCst)
    }

    fn read(&self, key: &str) -> Result<Option<String>, MediumError> {
        Ok(self.guard()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MediumError> {
        self.guard()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MediumError> {
        self.guard()?.remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<(), MediumError> {
        let mut values = self.guard()?;
        if let Some(next) = f(values.get(key).map(String::as_str)) {
            values.insert(key.to_owned(), next);
        }
        Ok(())
    }
}

//
// ─── FILES ─────────────────────────────────────────────────────────────────────
//

/// One file per key inside a profile directory.
#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Use `dir` as the profile directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `MediumError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MediumError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn ensure_available(&self) -> Result<(), MediumError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(MediumError::Unavailable)
        }
    }

    /// Advisory lock shared by every handle and process on this directory.
    /// The value file itself is replaced by rename, so the lock lives in a
    /// sibling file that is never swapped out.
    fn lock_for(&self, key: &str) -> Result<RwLock<File>, MediumError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(format!(".{key}.lock")))?;
        Ok(RwLock::new(file))
    }

    fn read_locked(&self, key: &str) -> Result<Option<String>, MediumError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write_locked(&self, key: &str, value: &str) -> Result<(), MediumError> {
        // Replace via rename so readers never observe a half-written value.
        let staging = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&staging, value)?;
        fs::rename(&staging, self.path_for(key))?;
        Ok(())
    }
}

impl KeyValueMedium for FileMedium {
    fn is_available(&self) -> bool {
        fs::metadata(&self.dir).is_ok_and(|meta| meta.is_dir() && !meta.permissions().readonly())
    }

    fn read(&self, key: &str) -> Result<Option<String>, MediumError> {
        self.ensure_available()?;
        self.read_locked(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MediumError> {
        self.ensure_available()?;
        let mut lock = self.lock_for(key)?;
        let _guard = lock.write()?;
        self.write_locked(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), MediumError> {
        self.ensure_available()?;
        let mut lock = self.lock_for(key)?;
        let _guard = lock.write()?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<(), MediumError> {
        self.ensure_available()?;
        let mut lock = self.lock_for(key)?;
        let _guard = lock.write()?;
        let current = self.read_locked(key)?;
        if let Some(next) = f(current.as_deref()) {
            self.write_locked(key, &next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_medium_clones_share_contents() {
        let a = MemoryMedium::new();
        let b = a.clone();
        a.write("k", "v").unwrap();
        assert_eq!(b.read("k").unwrap().as_deref(), Some("v"));
        b.remove("k").unwrap();
        assert_eq!(a.read("k").unwrap(), None);
    }

    #[test]
    fn disabled_memory_medium_refuses_access() {
        let medium = MemoryMedium::disabled();
        assert!(!medium.is_available());
        assert!(matches!(medium.read("k"), Err(MediumError::Unavailable)));
        medium.set_available(true);
        assert_eq!(medium.read("k").unwrap(), None);
    }

    #[test]
    fn file_medium_reads_writes_and_removes() {
        let tmp = tempfile::tempdir().unwrap();
        let medium = FileMedium::open(tmp.path().join("profile")).unwrap();
        assert!(medium.is_available());
        assert_eq!(medium.read("daily_goal").unwrap(), None);

        medium.write("daily_goal", "12").unwrap();
        assert_eq!(medium.read("daily_goal").unwrap().as_deref(), Some("12"));
        medium.write("daily_goal", "15").unwrap();
        assert_eq!(medium.read("daily_goal").unwrap().as_deref(), Some("15"));

        medium.remove("daily_goal").unwrap();
        medium.remove("daily_goal").unwrap();
        assert_eq!(medium.read("daily_goal").unwrap(), None);
    }

    #[test]
    fn file_medium_is_unavailable_once_directory_is_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("profile");
        let medium = FileMedium::open(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        assert!(!medium.is_available());
        assert!(matches!(medium.write("k", "v"), Err(MediumError::Unavailable)));
    }

    fn bump(raw: Option<&str>) -> Option<String> {
        let n: u32 = raw.map_or(0, |v| v.parse().unwrap());
        Some((n + 1).to_string())
    }

    #[test]
    fn memory_medium_updates_are_atomic_across_clones() {
        let medium = MemoryMedium::new();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = medium.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        handle.update("n", &mut bump).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(medium.read("n").unwrap().as_deref(), Some("2000"));
    }

    #[test]
    fn file_medium_updates_are_atomic_across_handles() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("profile");
        let workers: Vec<_> = (0..4)
            .map(|_| {
                // Separate handles, as two processes on one profile would have.
                let handle = FileMedium::open(&dir).unwrap();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        handle.update("n", &mut bump).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        let medium = FileMedium::open(&dir).unwrap();
        assert_eq!(medium.read("n").unwrap().as_deref(), Some("200"));
    }

    #[test]
    fn update_returning_none_keeps_the_value() {
        let medium = MemoryMedium::new();
        medium.write("k", "v").unwrap();
        medium.update("k", &mut |_| None).unwrap();
        assert_eq!(medium.read("k").unwrap().as_deref(), Some("v"));
    }
}
