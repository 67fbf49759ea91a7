use crate::build::{ActiveProfileSink, BuildMetadata};
use crate::codec::decode;
use crate::config::ProviderConfig;
use crate::fs::{FileSystem, OsFileSystem};
use crate::profile::{is_valid_profile_name, LaunchProfile};
use crate::project::{LocalPortAllocator, PortAllocator, ProjectContext};
use crate::reconciler::{DiskState, ReconcileInput, Reconciler};
use crate::sections::{is_reserved_section, SectionRegistry};
use crate::snapshot::{LaunchSettings, LaunchSettingsBuilder};
use crate::store::{SnapshotStore, SnapshotSubscription};
use crate::watcher::{SettingsChangeHandler, SettingsWatcher};
use crate::writer::{SaveOutcome, SaveTicket, SettingsWriter, SyncState};
use crate::{LaunchSettingsError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderHealth {
    pub last_error: Option<String>,
    pub warnings: Vec<String>,
    pub reconciliations: u64,
    pub saves: u64,
    pub abandoned_saves: u64,
    pub failed_saves: u64,
    pub last_reconciled_unix_ms: Option<u64>,
}

/// What a single reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reloaded: bool,
    pub broadcast: bool,
    pub persist_scheduled: bool,
    pub error: Option<String>,
}

pub struct ProviderBuilder {
    project: ProjectContext,
    fs: Arc<dyn FileSystem>,
    registry: SectionRegistry,
    ports: Arc<dyn PortAllocator>,
    config: ProviderConfig,
    active_sink: Option<Arc<dyn ActiveProfileSink>>,
}

impl ProviderBuilder {
    #[must_use]
    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    #[must_use]
    pub fn sections(mut self, registry: SectionRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn port_allocator(mut self, ports: Arc<dyn PortAllocator>) -> Self {
        self.ports = ports;
        self
    }

    #[must_use]
    pub const fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn active_profile_sink(mut self, sink: Arc<dyn ActiveProfileSink>) -> Self {
        self.active_sink = Some(sink);
        self
    }

    /// Creates the provider. Nothing is read until [`LaunchSettingsProvider::start`].
    #[must_use]
    pub fn build(self) -> LaunchSettingsProvider {
        let settings_path = self.project.settings_path();
        let (health_tx, _) = watch::channel(ProviderHealth::default());
        let inner = Arc::new_cyclic(|weak| ProviderInner {
            weak: weak.clone(),
            project: self.project,
            settings_path,
            fs: self.fs,
            registry: self.registry,
            ports: self.ports,
            config: self.config,
            active_sink: self.active_sink,
            store: SnapshotStore::new(),
            sync: SyncState::default(),
            reconcile: TokioMutex::new(ReconcileState::default()),
            token: CancellationToken::new(),
            watcher: Mutex::new(None),
            pending_saves: Mutex::new(Vec::new()),
            health_tx,
        });
        LaunchSettingsProvider { inner }
    }
}

/// Owns the launch settings of one project.
///
/// Clones share the same state. Background work stops when the last clone is
/// dropped or [`LaunchSettingsProvider::shutdown`] is called.
#[derive(Clone)]
pub struct LaunchSettingsProvider {
    inner: Arc<ProviderInner>,
}

#[derive(Debug, Default)]
struct ReconcileState {
    build: Option<BuildMetadata>,
}

struct ProviderInner {
    weak: Weak<ProviderInner>,
    project: ProjectContext,
    settings_path: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: SectionRegistry,
    ports: Arc<dyn PortAllocator>,
    config: ProviderConfig,
    active_sink: Option<Arc<dyn ActiveProfileSink>>,
    store: SnapshotStore,
    sync: SyncState,
    reconcile: TokioMutex<ReconcileState>,
    token: CancellationToken,
    watcher: Mutex<Option<SettingsWatcher>>,
    pending_saves: Mutex<Vec<JoinHandle<()>>>,
    health_tx: watch::Sender<ProviderHealth>,
}

impl LaunchSettingsProvider {
    pub fn builder(project: ProjectContext) -> ProviderBuilder {
        ProviderBuilder {
            project,
            fs: Arc::new(OsFileSystem),
            registry: SectionRegistry::new(),
            ports: Arc::new(LocalPortAllocator),
            config: ProviderConfig::default(),
            active_sink: None,
        }
    }

    /// Runs the first reconciliation and, when configured, starts watching
    /// the settings file.
    pub async fn start(&self) -> Result<ReconcileReport> {
        let report = self.refresh().await;
        if self.inner.config.watch {
            self.inner.start_watcher()?;
        }
        Ok(report)
    }

    /// Cancels the watcher, pending reloads and pending saves.
    pub fn shutdown(&self) {
        self.inner.token.cancel();
        if let Ok(mut watcher) = self.inner.watcher.lock() {
            watcher.take();
        }
    }

    #[must_use]
    pub fn project(&self) -> &ProjectContext {
        &self.inner.project
    }

    #[must_use]
    pub fn settings_path(&self) -> &Path {
        &self.inner.settings_path
    }

    #[must_use]
    pub fn current_snapshot(&self) -> Option<Arc<LaunchSettings>> {
        self.inner.store.current()
    }

    #[must_use]
    pub fn subscribe(&self) -> SnapshotSubscription {
        self.inner.store.subscribe()
    }

    pub async fn wait_for_first_snapshot(&self, timeout: Duration) -> Option<Arc<LaunchSettings>> {
        self.inner.store.wait_for_first(timeout).await
    }

    /// The current snapshot, or an error when none arrived in time or the
    /// settings failed to load.
    pub async fn snapshot_or_error(&self) -> Result<Arc<LaunchSettings>> {
        self.inner.snapshot_or_error().await
    }

    /// Reconciles against the file and the last known build metadata.
    pub async fn refresh(&self) -> ReconcileReport {
        let state = self.inner.reconcile.lock().await;
        self.inner.reconcile_locked(&state, None)
    }

    /// Feeds one build evaluation into reconciliation.
    pub async fn on_build_metadata(&self, metadata: BuildMetadata) -> ReconcileReport {
        self.inner.on_build_metadata(metadata).await
    }

    /// Forwards every evaluation received on `rx` until the provider stops.
    pub fn attach_build_metadata(&self, mut rx: mpsc::Receiver<BuildMetadata>) {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    metadata = rx.recv() => {
                        let Some(metadata) = metadata else { break };
                        let Some(inner) = weak.upgrade() else { break };
                        inner.on_build_metadata(metadata).await;
                    }
                }
            }
            debug!("build metadata subscription closed");
        });
    }

    /// Selects `name` as the active profile.
    pub async fn set_active_profile(&self, name: &str) -> Result<()> {
        if let Some(sink) = &self.inner.active_sink {
            sink.set_active_profile(name).await?;
        }
        let state = self.inner.reconcile.lock().await;
        let report = self.inner.reconcile_locked(&state, Some(name));
        match report.error {
            Some(message) => Err(LaunchSettingsError::Other(message)),
            None => Ok(()),
        }
    }

    /// Replaces the current snapshot with a caller-edited one, writing the
    /// file when anything persisted changed.
    pub async fn update_and_save(&self, settings: LaunchSettings) -> Result<()> {
        let _state = self.inner.reconcile.lock().await;
        let current = self.inner.store.current();
        self.inner.save_and_publish(current.as_deref(), settings)
    }

    /// Adds `profile` or replaces the profile with the same name.
    pub async fn add_or_update_profile(
        &self,
        profile: LaunchProfile,
        insert_at_front: bool,
    ) -> Result<()> {
        if !is_valid_profile_name(&profile.name) {
            return Err(LaunchSettingsError::Other(
                "profile name must not be empty".to_string(),
            ));
        }
        self.inner
            .edit(|builder| builder.add_or_update_profile(profile, insert_at_front))
            .await
    }

    /// Removes the named profile; a missing profile is not an error.
    pub async fn remove_profile(&self, name: &str) -> Result<()> {
        self.inner.edit(|builder| builder.remove_profile(name)).await
    }

    pub async fn add_or_update_global_setting(&self, key: &str, value: Value) -> Result<()> {
        if is_reserved_section(key) {
            return Err(LaunchSettingsError::Other(format!(
                "'{key}' is not a global setting"
            )));
        }
        let setting = self.inner.registry.classify(key, value)?;
        self.inner
            .edit(|builder| builder.global_setting(key, setting))
            .await
    }

    pub async fn remove_global_setting(&self, key: &str) -> Result<()> {
        self.inner
            .edit(|builder| builder.remove_global_setting(key))
            .await
    }

    /// Waits for deferred saves scheduled so far.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = match self.inner.pending_saves.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[must_use]
    pub fn health(&self) -> ProviderHealth {
        self.inner.health_tx.borrow().clone()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<ProviderHealth> {
        self.inner.health_tx.subscribe()
    }

    /// Number of directories the file watcher observes.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.inner
            .watcher
            .lock()
            .ok()
            .and_then(|w| w.as_ref().map(SettingsWatcher::watch_count))
            .unwrap_or(0)
    }
}

impl Drop for LaunchSettingsProvider {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.token.cancel();
        }
    }
}

impl Drop for ProviderInner {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl ProviderInner {
    fn writer(&self) -> SettingsWriter<'_> {
        SettingsWriter::new(
            self.fs.as_ref(),
            &self.settings_path,
            &self.registry,
            &self.sync,
        )
    }

    fn start_watcher(&self) -> Result<()> {
        let mut slot = self
            .watcher
            .lock()
            .map_err(|_| LaunchSettingsError::Other("watcher lock poisoned".to_string()))?;
        if slot.is_some() || self.token.is_cancelled() {
            return Ok(());
        }
        let handler: Weak<dyn SettingsChangeHandler> = self.weak.clone();
        let watcher = SettingsWatcher::start(
            &self.project,
            self.config.file_change_delay,
            self.token.clone(),
            handler,
        )?;
        info!(
            "watching {} ({} directories)",
            self.settings_path.display(),
            watcher.watch_count()
        );
        *slot = Some(watcher);
        Ok(())
    }

    async fn snapshot_or_error(&self) -> Result<Arc<LaunchSettings>> {
        let timeout = self.config.first_snapshot_timeout;
        let Some(snapshot) = self.store.wait_for_first(timeout).await else {
            return Err(LaunchSettingsError::SnapshotUnavailable {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        };
        if snapshot.is_error_placeholder() {
            return Err(LaunchSettingsError::SettingsHaveErrors {
                path: self.settings_path.clone(),
                detail: snapshot.error_message().map(str::to_string),
            });
        }
        Ok(snapshot)
    }

    async fn on_build_metadata(&self, metadata: BuildMetadata) -> ReconcileReport {
        let mut state = self.reconcile.lock().await;
        let active = metadata.active_profile().map(str::to_string);
        state.build = Some(metadata);
        self.reconcile_locked(&state, active.as_deref())
    }

    async fn edit<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(LaunchSettingsBuilder) -> LaunchSettingsBuilder,
    {
        self.snapshot_or_error().await?;
        let _state = self.reconcile.lock().await;
        let current = self
            .store
            .current()
            .ok_or(LaunchSettingsError::SnapshotUnavailable { timeout_ms: 0 })?;
        let edited = apply(current.to_builder()).build();
        self.save_and_publish(Some(current.as_ref()), edited)
    }

    /// Caller must hold the reconcile lock.
    fn save_and_publish(
        &self,
        current: Option<&LaunchSettings>,
        settings: LaunchSettings,
    ) -> Result<()> {
        let settings = settle(settings);
        let content_changed = current.map_or(true, |c| c.content_differs(&settings));
        let active_changed =
            current.map_or(true, |c| c.active_profile_name() != settings.active_profile_name());
        if content_changed {
            self.writer().write(&settings)?;
            self.update_health(|h| h.saves += 1);
        }
        if content_changed || active_changed {
            self.store.publish(settings);
        }
        Ok(())
    }

    /// One reconciliation pass. Caller must hold the reconcile lock.
    fn reconcile_locked(
        &self,
        state: &ReconcileState,
        active_override: Option<&str>,
    ) -> ReconcileReport {
        let previous = self.store.current();
        let report = match self.run_pass(previous.as_deref(), state, active_override) {
            Ok(report) => report,
            Err(err) => self.handle_failure(&err),
        };
        self.update_health(|h| {
            h.reconciliations += 1;
            h.last_reconciled_unix_ms = Some(current_unix_ms());
        });
        report
    }

    fn run_pass(
        &self,
        previous: Option<&LaunchSettings>,
        state: &ReconcileState,
        active_override: Option<&str>,
    ) -> Result<ReconcileReport> {
        let path = &self.settings_path;
        let stamp = self.fs.modified(path)?;
        let needs_reload = previous.map_or(true, LaunchSettings::is_error_placeholder)
            || stamp.is_none()
            || stamp != self.sync.last_synced();

        let mut warnings: Option<Vec<String>> = None;
        let disk = if needs_reload {
            match self.fs.read_to_string(path)? {
                None => DiskState::Missing,
                Some(raw) => {
                    let doc = decode(&raw, &self.registry)?;
                    info!("loaded {} profile(s) from {}", doc.profiles.len(), path.display());
                    warnings = Some(doc.warnings.iter().map(ToString::to_string).collect());
                    DiskState::Loaded(doc)
                }
            }
        } else {
            DiskState::Unchanged
        };

        let commands = state.build.as_ref().map(|b| b.commands.as_slice());
        let outcome = Reconciler::new(&self.project, self.ports.as_ref(), &self.registry)
            .reconcile(ReconcileInput {
                previous,
                disk,
                active_override,
                commands,
            })?;

        if needs_reload {
            self.sync.set_last_synced(stamp);
            let warnings = warnings.unwrap_or_default();
            self.update_health(|h| {
                h.last_error = None;
                h.warnings = warnings;
            });
        }

        let mut report = ReconcileReport {
            reloaded: needs_reload,
            broadcast: outcome.broadcast,
            persist_scheduled: outcome.persist,
            error: None,
        };
        let snapshot = Arc::new(outcome.snapshot);
        if outcome.broadcast {
            self.store.publish(Arc::clone(&snapshot));
        }
        if outcome.persist {
            let ticket = SaveTicket {
                snapshot,
                stamp: self.fs.stamp(path),
            };
            report.persist_scheduled = self.schedule_save(ticket);
        }
        Ok(report)
    }

    fn handle_failure(&self, err: &LaunchSettingsError) -> ReconcileReport {
        let message = err.to_string();
        error!(
            "failed to reconcile {}: {message}",
            self.settings_path.display()
        );
        self.update_health(|h| h.last_error = Some(message.clone()));

        let mut report = ReconcileReport {
            error: Some(message.clone()),
            ..ReconcileReport::default()
        };
        if self.store.current().is_none() {
            warn!("publishing error placeholder for {}", self.settings_path.display());
            self.store.publish(LaunchSettings::error(message));
            report.broadcast = true;
        }
        report
    }

    fn schedule_save(&self, ticket: SaveTicket) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let weak = self.weak.clone();
        let token = self.token.clone();
        let delay = self.config.save_delay;
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            if token.is_cancelled() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.run_deferred_save(ticket).await;
            }
        });
        if let Ok(mut pending) = self.pending_saves.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
        true
    }

    async fn run_deferred_save(&self, ticket: SaveTicket) {
        let _state = self.reconcile.lock().await;
        let current = self.store.current();
        match self.writer().try_save(&ticket, current.as_deref()) {
            Ok(SaveOutcome::Saved) => self.update_health(|h| h.saves += 1),
            Ok(outcome) => {
                debug!("deferred save abandoned: {outcome:?}");
                self.update_health(|h| h.abandoned_saves += 1);
            }
            Err(err) => {
                error!("failed to save {}: {err}", self.settings_path.display());
                self.update_health(|h| h.failed_saves += 1);
            }
        }
    }

    fn update_health(&self, apply: impl FnOnce(&mut ProviderHealth)) {
        self.health_tx.send_modify(apply);
    }
}

#[async_trait]
impl SettingsChangeHandler for ProviderInner {
    fn is_external_change(&self) -> bool {
        if self.sync.is_ignoring_changes() {
            return false;
        }
        let stamp = self.fs.stamp(&self.settings_path);
        stamp.is_none() || stamp != self.sync.last_synced()
    }

    async fn settings_changed(&self) {
        if self.token.is_cancelled() {
            return;
        }
        debug!("{} changed on disk", self.settings_path.display());
        let state = self.reconcile.lock().await;
        self.reconcile_locked(&state, None);
    }
}

/// Synthetic entries only ever stand alone, and the active name refers to a
/// listed profile.
fn settle(settings: LaunchSettings) -> LaunchSettings {
    let mut profiles: Vec<LaunchProfile> = settings
        .profiles()
        .iter()
        .filter(|p| !p.kind.is_synthetic())
        .cloned()
        .collect();
    if profiles.is_empty() {
        profiles.push(LaunchProfile::no_action());
    }
    let active = settings
        .active_profile_name()
        .filter(|name| profiles.iter().any(|p| p.name == *name))
        .map(str::to_string)
        .or_else(|| profiles.first().map(|p| p.name.clone()));
    settings
        .to_builder()
        .profiles(profiles)
        .active_profile(active)
        .build()
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::project::ProjectFlavor;

    #[test]
    fn dropping_inner_state_cancels_background_work() {
        let project = ProjectContext::new("/work/app", ProjectFlavor::Library);
        let provider = LaunchSettingsProvider::builder(project)
            .file_system(Arc::new(MemoryFileSystem::new()))
            .build();
        let token = provider.inner.token.clone();
        let upgraded = Arc::clone(&provider.inner);
        let other = provider.clone();

        drop(provider);
        drop(other);
        assert_eq!(Arc::strong_count(&upgraded), 1);
        drop(upgraded);
        assert!(token.is_cancelled());
    }
}
