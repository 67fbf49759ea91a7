//! File access used by the provider. Writes replace the target through a
//! sibling temp file so a failed write never leaves a truncated document.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Modification time of a file, `None` when it does not exist.
pub type FileStamp = Option<SystemTime>;

pub trait FileSystem: Send + Sync {
    /// Returns `Ok(None)` when the file does not exist.
    fn read_to_string(&self, path: &Path) -> io::Result<Option<String>>;

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn modified(&self, path: &Path) -> io::Result<FileStamp>;

    /// Same as [`FileSystem::modified`], logging and swallowing unexpected
    /// errors as "absent".
    fn stamp(&self, path: &Path) -> FileStamp {
        match self.modified(path) {
            Ok(stamp) => stamp,
            Err(err) => {
                log::warn!("failed to stat {}: {err}", path.display());
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        std::fs::write(&tmp, contents)?;
        if let Err(err) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(())
    }

    fn modified(&self, path: &Path) -> io::Result<FileStamp> {
        match std::fs::metadata(path) {
            Ok(meta) => meta.modified().map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// In-process file system with a deterministic clock: every write advances
/// the modification time by one second.
///
/// Useful for hosts that keep settings in memory and for exercising the
/// concurrency checks without real timestamps.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, (String, SystemTime)>>,
    clock: AtomicU64,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> SystemTime {
        let secs = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, HashMap<PathBuf, (String, SystemTime)>>> {
        self.files
            .lock()
            .map_err(|_| io::Error::new(ErrorKind::Other, "memory file system poisoned"))
    }

    /// Writes as an outside editor would, bumping the modification time.
    pub fn write(&self, path: impl Into<PathBuf>, contents: impl Into<String>) -> io::Result<()> {
        let stamp = self.tick();
        self.lock()?.insert(path.into(), (contents.into(), stamp));
        Ok(())
    }

    /// Bumps the modification time without changing the contents.
    pub fn touch(&self, path: &Path) -> io::Result<()> {
        let stamp = self.tick();
        let mut files = self.lock()?;
        let entry = files
            .get_mut(path)
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, path.display().to_string()))?;
        entry.1 = stamp;
        Ok(())
    }

    pub fn remove(&self, path: &Path) -> io::Result<()> {
        self.lock()?.remove(path);
        Ok(())
    }

    #[must_use]
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.lock().ok()?.get(path).map(|(c, _)| c.clone())
    }

    /// Makes subsequent [`FileSystem::write_atomic`] calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(self.lock()?.get(path).map(|(c, _)| c.clone()))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("write to {} rejected", path.display()),
            ));
        }
        self.write(path, contents)
    }

    fn modified(&self, path: &Path) -> io::Result<FileStamp> {
        Ok(self.lock()?.get(path).map(|(_, stamp)| *stamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn os_write_creates_parent_and_replaces_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Properties").join("launchSettings.json");
        let fs = OsFileSystem;

        assert_eq!(fs.read_to_string(&path).unwrap(), None);
        assert_eq!(fs.modified(&path).unwrap(), None);

        fs.write_atomic(&path, "{}").unwrap();
        fs.write_atomic(&path, "{\"profiles\": {}}").unwrap();
        assert_eq!(
            fs.read_to_string(&path).unwrap().as_deref(),
            Some("{\"profiles\": {}}")
        );
        assert!(fs.modified(&path).unwrap().is_some());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn memory_clock_advances_on_every_write() {
        let fs = MemoryFileSystem::new();
        let path = Path::new("/p/launchSettings.json");
        fs.write(path, "a").unwrap();
        let first = fs.modified(path).unwrap();
        fs.touch(path).unwrap();
        let second = fs.modified(path).unwrap();
        assert!(first.is_some());
        assert_ne!(first, second);
        assert_eq!(fs.contents(path).as_deref(), Some("a"));
    }

    #[test]
    fn memory_writes_can_be_rejected() {
        let fs = MemoryFileSystem::new();
        fs.set_fail_writes(true);
        assert!(fs.write_atomic(Path::new("/x"), "a").is_err());
        assert_eq!(fs.contents(Path::new("/x")), None);
    }
}
