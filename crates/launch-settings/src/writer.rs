use crate::codec::encode;
use crate::fs::{FileStamp, FileSystem};
use crate::sections::SectionRegistry;
use crate::snapshot::LaunchSettings;
use crate::Result;
use log::{debug, info};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What the provider knows about its own reads and writes of the file.
#[derive(Debug, Default)]
pub struct SyncState {
    last_synced: Mutex<FileStamp>,
    ignore_changes: AtomicBool,
}

impl SyncState {
    #[must_use]
    pub fn last_synced(&self) -> FileStamp {
        self.last_synced.lock().map_or(None, |guard| *guard)
    }

    pub fn set_last_synced(&self, stamp: FileStamp) {
        if let Ok(mut guard) = self.last_synced.lock() {
            *guard = stamp;
        }
    }

    /// True while the provider itself is writing the file.
    #[must_use]
    pub fn is_ignoring_changes(&self) -> bool {
        self.ignore_changes.load(Ordering::SeqCst)
    }

    fn ignore_changes(&self) -> IgnoreGuard<'_> {
        self.ignore_changes.store(true, Ordering::SeqCst);
        IgnoreGuard { state: self }
    }
}

struct IgnoreGuard<'a> {
    state: &'a SyncState,
}

impl Drop for IgnoreGuard<'_> {
    fn drop(&mut self) {
        self.state.ignore_changes.store(false, Ordering::SeqCst);
    }
}

/// A save decided by the reconciler, with the file stamp seen at that moment.
#[derive(Debug, Clone)]
pub struct SaveTicket {
    pub snapshot: Arc<LaunchSettings>,
    pub stamp: FileStamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// A newer snapshot with different content replaced the one to save.
    Superseded,
    /// The file changed on disk after the save was scheduled.
    ExternallyModified,
}

pub struct SettingsWriter<'a> {
    fs: &'a dyn FileSystem,
    path: &'a Path,
    registry: &'a SectionRegistry,
    sync: &'a SyncState,
}

impl<'a> SettingsWriter<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        path: &'a Path,
        registry: &'a SectionRegistry,
        sync: &'a SyncState,
    ) -> Self {
        Self {
            fs,
            path,
            registry,
            sync,
        }
    }

    /// Writes unconditionally and records the resulting stamp.
    pub fn write(&self, settings: &LaunchSettings) -> Result<()> {
        let contents = encode(settings, self.registry)?;
        let _guard = self.sync.ignore_changes();
        self.fs.write_atomic(self.path, &contents)?;
        self.sync.set_last_synced(self.fs.stamp(self.path));
        info!("wrote {}", self.path.display());
        Ok(())
    }

    /// Writes the ticket's snapshot unless it went stale.
    pub fn try_save(
        &self,
        ticket: &SaveTicket,
        current: Option<&LaunchSettings>,
    ) -> Result<SaveOutcome> {
        let still_current = current.is_some_and(|c| !c.content_differs(&ticket.snapshot));
        if !still_current {
            debug!("save of {} superseded by a newer snapshot", self.path.display());
            return Ok(SaveOutcome::Superseded);
        }

        let now = self.fs.stamp(self.path);
        if now.is_some() && now != ticket.stamp {
            debug!(
                "{} changed on disk since the save was scheduled; leaving it alone",
                self.path.display()
            );
            return Ok(SaveOutcome::ExternallyModified);
        }

        self.write(&ticket.snapshot)?;
        Ok(SaveOutcome::Saved)
    }
}
