use crate::project::{ProjectContext, LAUNCH_SETTINGS_FILE_NAME};
use crate::{LaunchSettingsError, Result};
use async_trait::async_trait;
use log::{debug, warn};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const NOTIFY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Receives debounced change notifications for the settings file.
#[async_trait]
pub(crate) trait SettingsChangeHandler: Send + Sync {
    /// Whether the file on disk differs from what the handler last read or
    /// wrote. Notifications are dropped when this is false.
    fn is_external_change(&self) -> bool;

    async fn settings_changed(&self);
}

#[derive(Debug, Default)]
struct DebounceSlot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// Single-slot delayed action: scheduling again before the delay elapses
/// replaces the pending action and restarts the delay.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    token: CancellationToken,
    slot: Arc<Mutex<DebounceSlot>>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration, token: CancellationToken) -> Self {
        Self {
            delay,
            token,
            slot: Arc::new(Mutex::new(DebounceSlot::default())),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            return;
        }
        let Ok(mut slot) = self.slot.lock() else {
            return;
        };
        if let Some(previous) = slot.pending.take() {
            previous.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let shared = Arc::clone(&self.slot);
        let token = self.token.clone();
        let delay = self.delay;
        slot.pending = Some(tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            {
                let Ok(mut slot) = shared.lock() else {
                    return;
                };
                if slot.generation != generation {
                    return;
                }
                // Once claimed, a later schedule must not abort the running action.
                slot.pending = None;
            }
            if token.is_cancelled() {
                return;
            }
            action().await;
        }));
    }

    /// Whether an action is waiting for its delay to elapse.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.pending.is_some())
            .unwrap_or(false)
    }
}

/// Keeps the OS watcher alive; the event loop stops when the token fires.
pub(crate) struct SettingsWatcher {
    _watcher: Arc<Mutex<RecommendedWatcher>>,
    watched: Arc<Mutex<HashSet<PathBuf>>>,
}

impl SettingsWatcher {
    pub(crate) fn start(
        project: &ProjectContext,
        delay: Duration,
        token: CancellationToken,
        handler: Weak<dyn SettingsChangeHandler>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default().with_poll_interval(NOTIFY_POLL_INTERVAL),
        )
        .map_err(|e| LaunchSettingsError::Other(format!("watcher init failed: {e}")))?;
        let watcher = Arc::new(Mutex::new(watcher));
        let watched = Arc::new(Mutex::new(HashSet::new()));

        let settings_dir = project.settings_dir();
        for dir in [project.root().to_path_buf(), settings_dir.clone()] {
            add_watch(&watcher, &watched, &dir);
        }

        let debouncer = Debouncer::new(delay, token.child_token());
        spawn_event_loop(
            event_rx,
            settings_dir,
            token,
            debouncer,
            handler,
            Arc::clone(&watcher),
            Arc::clone(&watched),
        );

        Ok(Self {
            _watcher: watcher,
            watched,
        })
    }

    pub(crate) fn watch_count(&self) -> usize {
        self.watched.lock().map(|w| w.len()).unwrap_or(0)
    }
}

fn add_watch(
    watcher: &Arc<Mutex<RecommendedWatcher>>,
    watched: &Arc<Mutex<HashSet<PathBuf>>>,
    dir: &Path,
) {
    if !dir.is_dir() {
        return;
    }
    let (Ok(mut watcher), Ok(mut watched)) = (watcher.lock(), watched.lock()) else {
        return;
    };
    if watched.contains(dir) {
        return;
    }
    match watcher.watch(dir, RecursiveMode::NonRecursive) {
        Ok(()) => {
            debug!("watching {}", dir.display());
            watched.insert(dir.to_path_buf());
        }
        Err(err) => warn!("failed to watch {}: {err}", dir.display()),
    }
}

fn spawn_event_loop(
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    settings_dir: PathBuf,
    token: CancellationToken,
    debouncer: Debouncer,
    handler: Weak<dyn SettingsChangeHandler>,
    watcher: Arc<Mutex<RecommendedWatcher>>,
    watched: Arc<Mutex<HashSet<PathBuf>>>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Ok(evt) if is_relevant_event(&evt, &settings_dir) => {
                            if evt.paths.iter().any(|p| p == &settings_dir) {
                                add_watch(&watcher, &watched, &settings_dir);
                            }
                            if !on_settings_event(&debouncer, &handler) {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(err) => warn!("settings watcher error: {err}"),
                    }
                }
            }
        }
        debug!("settings watcher for {} stopped", settings_dir.display());
    });
}

/// Returns false once the handler is gone.
fn on_settings_event(debouncer: &Debouncer, handler: &Weak<dyn SettingsChangeHandler>) -> bool {
    let Some(strong) = handler.upgrade() else {
        return false;
    };
    if !strong.is_external_change() {
        debug!("ignoring notification for a change made by this process");
        return true;
    }
    let handler = handler.clone();
    debouncer.schedule(move || async move {
        if let Some(handler) = handler.upgrade() {
            handler.settings_changed().await;
        }
    });
    true
}

fn is_relevant_event(event: &Event, settings_dir: &Path) -> bool {
    event
        .paths
        .iter()
        .any(|path| is_relevant_path(path, settings_dir))
}

fn is_relevant_path(path: &Path, settings_dir: &Path) -> bool {
    if path == settings_dir {
        return true;
    }
    path.parent() == Some(settings_dir)
        && path.file_name().is_some_and(|name| name == LAUNCH_SETTINGS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(debouncer: &Debouncer, counter: &Arc<AtomicUsize>) {
        let counter = Arc::clone(counter);
        debouncer.schedule(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once_after_quiet_period() {
        let debouncer = Debouncer::new(Duration::from_millis(500), CancellationToken::new());
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            counting(&debouncer, &fired);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn new_notification_restarts_delay() {
        let debouncer = Debouncer::new(Duration::from_millis(500), CancellationToken::new());
        let fired = Arc::new(AtomicUsize::new(0));
        counting(&debouncer, &fired);
        tokio::time::sleep(Duration::from_millis(400)).await;
        counting(&debouncer, &fired);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_debouncer_does_nothing() {
        let token = CancellationToken::new();
        let debouncer = Debouncer::new(Duration::from_millis(500), token.clone());
        let fired = Arc::new(AtomicUsize::new(0));
        counting(&debouncer, &fired);
        token.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        counting(&debouncer, &fired);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn relevance_is_limited_to_settings_file() {
        let dir = PathBuf::from("/proj/Properties");
        assert!(is_relevant_path(&dir.join("launchSettings.json"), &dir));
        assert!(is_relevant_path(&dir, &dir));
        assert!(!is_relevant_path(&dir.join("AssemblyInfo.cs"), &dir));
        assert!(!is_relevant_path(
            &PathBuf::from("/proj/launchSettings.json"),
            &dir
        ));
    }
}
