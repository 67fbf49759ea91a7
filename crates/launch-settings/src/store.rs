use crate::snapshot::LaunchSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
struct Published {
    version: u64,
    snapshot: Option<Arc<LaunchSettings>>,
}

/// Holds the current snapshot and fans it out to subscribers.
///
/// Subscribers see the latest value only; a slow subscriber never holds up
/// publication.
#[derive(Debug)]
pub struct SnapshotStore {
    tx: watch::Sender<Published>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Published::default());
        Self { tx }
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<LaunchSettings>> {
        self.tx.borrow().snapshot.clone()
    }

    /// Number of snapshots published so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Replaces the current snapshot and returns the new version.
    pub fn publish(&self, snapshot: impl Into<Arc<LaunchSettings>>) -> u64 {
        let snapshot = snapshot.into();
        let mut version = 0;
        self.tx.send_modify(|published| {
            published.version += 1;
            published.snapshot = Some(snapshot);
            version = published.version;
        });
        version
    }

    /// Publishes only if nothing else was published since `expected_version`.
    pub fn publish_if_version(
        &self,
        expected_version: u64,
        snapshot: impl Into<Arc<LaunchSettings>>,
    ) -> bool {
        let snapshot = snapshot.into();
        self.tx.send_if_modified(|published| {
            if published.version != expected_version {
                return false;
            }
            published.version += 1;
            published.snapshot = Some(snapshot);
            true
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> SnapshotSubscription {
        SnapshotSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Waits until a snapshot exists or `timeout` elapses, returning whatever
    /// is current at that point.
    pub async fn wait_for_first(&self, timeout: Duration) -> Option<Arc<LaunchSettings>> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|p| p.snapshot.is_some())).await;
        match waited {
            Ok(Ok(published)) => published.snapshot.clone(),
            _ => self.current(),
        }
    }
}

/// A live view of published snapshots. Dropping it detaches.
#[derive(Debug)]
pub struct SnapshotSubscription {
    rx: watch::Receiver<Published>,
}

impl SnapshotSubscription {
    /// Waits for the next publication and returns it. `None` once the
    /// provider is gone.
    pub async fn changed(&mut self) -> Option<Arc<LaunchSettings>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(snapshot) = self.rx.borrow_and_update().snapshot.clone() {
                return Some(snapshot);
            }
        }
    }

    /// The latest snapshot, marking it as seen.
    pub fn latest(&mut self) -> Option<Arc<LaunchSettings>> {
        self.rx.borrow_and_update().snapshot.clone()
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{LaunchProfile, ProfileKind};
    use crate::snapshot::GlobalSettings;

    fn snapshot(name: &str) -> LaunchSettings {
        LaunchSettings::new(
            vec![LaunchProfile::new(name, ProfileKind::Executable)],
            None,
            GlobalSettings::new(),
            None,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_first_times_out_without_snapshot() {
        let store = SnapshotStore::new();
        assert!(store
            .wait_for_first(Duration::from_millis(50))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn wait_for_first_sees_later_publication() {
        let store = Arc::new(SnapshotStore::new());
        let publisher = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(snapshot("a"));
        });
        let first = store.wait_for_first(Duration::from_secs(5)).await.unwrap();
        assert_eq!(first.profiles()[0].name, "a");
    }

    #[tokio::test]
    async fn subscribers_observe_latest_value() {
        let store = SnapshotStore::new();
        let mut sub = store.subscribe();
        store.publish(snapshot("a"));
        store.publish(snapshot("b"));
        let seen = sub.changed().await.unwrap();
        assert_eq!(seen.profiles()[0].name, "b");
        assert_eq!(store.version(), 2);
        sub.unsubscribe();
    }

    #[test]
    fn publish_if_version_rejects_stale_writers() {
        let store = SnapshotStore::new();
        let v1 = store.publish(snapshot("a"));
        assert!(store.publish_if_version(v1, snapshot("b")));
        assert!(!store.publish_if_version(v1, snapshot("c")));
        assert_eq!(store.current().unwrap().profiles()[0].name, "b");
    }
}
