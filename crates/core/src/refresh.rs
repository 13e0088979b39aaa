//! Auto-refresh settings and the new-block watcher.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::rpc::EthClient;
use crate::store::{LocalStore, StoreError};

pub const SETTINGS_KEY: &str = "autoRefreshSettings";
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;
pub const MIN_INTERVAL_MS: u64 = 1_000;

/// Upper bound of the retry delay after consecutive failures.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRefreshSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval", rename = "interval")]
    pub interval_ms: u64,
    #[serde(default)]
    pub block_watching: bool,
}

impl Default for AutoRefreshSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_INTERVAL_MS,
            block_watching: false,
        }
    }
}

impl AutoRefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Persisted auto-refresh settings with change notification.
///
/// Block watching is only ever on while auto refresh is enabled; every update
/// enforces that before the settings are saved.
pub struct AutoRefresh {
    store: Arc<LocalStore>,
    tx: watch::Sender<AutoRefreshSettings>,
}

impl AutoRefresh {
    pub fn load(store: Arc<LocalStore>) -> Self {
        let settings = match store.get::<AutoRefreshSettings>(SETTINGS_KEY) {
            Ok(Some(mut settings)) => {
                settings.block_watching &= settings.enabled;
                settings
            }
            Ok(None) => AutoRefreshSettings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load auto refresh settings");
                AutoRefreshSettings::default()
            }
        };
        let (tx, _) = watch::channel(settings);
        Self { store, tx }
    }

    pub fn settings(&self) -> AutoRefreshSettings {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutoRefreshSettings> {
        self.tx.subscribe()
    }

    /// Pick up settings saved by another process. Subscribers are notified
    /// only when something changed.
    pub fn reload(&self) -> Result<bool, StoreError> {
        let Some(mut stored) = self.store.get::<AutoRefreshSettings>(SETTINGS_KEY)? else {
            return Ok(false);
        };
        stored.block_watching &= stored.enabled;
        Ok(self.tx.send_if_modified(|current| {
            let changed = *current != stored;
            *current = stored;
            changed
        }))
    }

    pub fn toggle(&self) -> Result<AutoRefreshSettings, StoreError> {
        self.update(|s| s.enabled = !s.enabled)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<AutoRefreshSettings, StoreError> {
        self.update(|s| s.enabled = enabled)
    }

    pub fn set_interval(&self, interval_ms: u64) -> Result<AutoRefreshSettings, StoreError> {
        self.update(|s| s.interval_ms = interval_ms.max(MIN_INTERVAL_MS))
    }

    /// Has no effect on watching while auto refresh is disabled.
    pub fn set_block_watching(&self, watching: bool) -> Result<AutoRefreshSettings, StoreError> {
        self.update(|s| s.block_watching = watching)
    }

    fn update(
        &self,
        change: impl FnOnce(&mut AutoRefreshSettings),
    ) -> Result<AutoRefreshSettings, StoreError> {
        let mut next = self.settings();
        change(&mut next);
        next.block_watching &= next.enabled;
        self.store.set(SETTINGS_KEY, &next)?;
        self.tx.send_replace(next);
        tracing::debug!(
            enabled = next.enabled,
            interval_ms = next.interval_ms,
            block_watching = next.block_watching,
            "Auto refresh settings changed"
        );
        Ok(next)
    }
}

/// `base` plus up to 25% random jitter.
pub(crate) fn with_jitter(base: Duration) -> Duration {
    let spread = (base.as_millis() as u64) / 4;
    let jitter = if spread == 0 {
        0
    } else {
        rand::rng().random_range(0..=spread)
    };
    base + Duration::from_millis(jitter)
}

pub(crate) fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

// =============================================================================
// BlockWatcher
// =============================================================================

/// Background task that reports new block numbers.
///
/// Every block number is sent once, in ascending order. Stops when the
/// receiver is dropped, or when the watcher is stopped or dropped.
pub struct BlockWatcher {
    task: JoinHandle<()>,
}

impl BlockWatcher {
    pub fn spawn(client: EthClient, poll: Duration) -> (Self, mpsc::Receiver<u64>) {
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(watch_blocks(client, poll, tx));
        (Self { task }, rx)
    }

    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for BlockWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A [`BlockWatcher`] that runs only while block watching is switched on.
pub struct BlockFeed {
    client: EthClient,
    poll: Duration,
    running: Option<(BlockWatcher, mpsc::Receiver<u64>)>,
}

impl BlockFeed {
    pub fn new(client: EthClient, poll: Duration) -> Self {
        Self {
            client,
            poll,
            running: None,
        }
    }

    /// Start or stop the watcher to match `settings.block_watching`.
    pub fn apply(&mut self, settings: &AutoRefreshSettings) {
        match (settings.block_watching, self.running.is_some()) {
            (true, false) => {
                self.running = Some(BlockWatcher::spawn(self.client.clone(), self.poll));
                tracing::info!(poll = ?self.poll, "Block watching started");
            }
            (false, true) => {
                self.stop();
                tracing::info!("Block watching stopped");
            }
            _ => {}
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn stop(&mut self) {
        if let Some((watcher, _)) = self.running.take() {
            watcher.stop();
        }
    }

    /// Next new block number. Never resolves while watching is off.
    pub async fn next_block(&mut self) -> u64 {
        if let Some((_, rx)) = &mut self.running {
            if let Some(number) = rx.recv().await {
                return number;
            }
        }
        self.running = None;
        std::future::pending().await
    }
}

async fn watch_blocks(client: EthClient, poll: Duration, tx: mpsc::Sender<u64>) {
    let mut last: Option<u64> = None;
    let mut backoff = poll;

    loop {
        if tx.is_closed() {
            return;
        }
        match client.block_number().await {
            Ok(head) => {
                backoff = poll;
                let first = match last {
                    None => head,
                    Some(prev) if head > prev => prev + 1,
                    Some(prev) if head < prev => {
                        tracing::warn!(prev, head, "Block height went backwards, chain was reset");
                        head
                    }
                    Some(_) => head + 1,
                };
                for number in first..=head {
                    if tx.send(number).await.is_err() {
                        return;
                    }
                }
                last = Some(head);
                tokio::time::sleep(poll).await;
            }
            Err(e) => {
                let delay = with_jitter(backoff);
                tracing::warn!(error = %e, retry_in = ?delay, "Block number poll failed");
                tokio::time::sleep(delay).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use testresult::TestResult;

    fn settings_store() -> (tempfile::TempDir, Arc<LocalStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::in_dir(dir.path()).unwrap());
        (dir, store)
    }

    #[test]
    fn test_defaults() {
        let (_dir, store) = settings_store();
        let refresh = AutoRefresh::load(store);
        assert_eq!(refresh.settings(), AutoRefreshSettings::default());
        assert_eq!(refresh.settings().interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_block_watching_requires_enabled() -> TestResult {
        let (_dir, store) = settings_store();
        let refresh = AutoRefresh::load(store);

        assert!(!refresh.set_block_watching(true)?.block_watching);
        refresh.set_enabled(true)?;
        assert!(refresh.set_block_watching(true)?.block_watching);
        Ok(())
    }

    #[test]
    fn test_disabling_clears_watching_before_save() -> TestResult {
        let (_dir, store) = settings_store();
        let refresh = AutoRefresh::load(store.clone());
        refresh.set_enabled(true)?;
        refresh.set_block_watching(true)?;
        refresh.toggle()?;

        let saved: AutoRefreshSettings = store.get(SETTINGS_KEY)?.unwrap();
        assert!(!saved.enabled);
        assert!(!saved.block_watching);
        Ok(())
    }

    #[test]
    fn test_settings_persist_with_wire_names() -> TestResult {
        let (_dir, store) = settings_store();
        AutoRefresh::load(store.clone()).set_interval(10_000)?;

        let raw: serde_json::Value = store.get(SETTINGS_KEY)?.unwrap();
        assert_eq!(raw["interval"], 10_000);
        assert_eq!(AutoRefresh::load(store).settings().interval_ms, 10_000);
        Ok(())
    }

    #[test]
    fn test_interval_floor() -> TestResult {
        let (_dir, store) = settings_store();
        let refresh = AutoRefresh::load(store);
        assert_eq!(refresh.set_interval(5)?.interval_ms, MIN_INTERVAL_MS);
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() -> TestResult {
        let (_dir, store) = settings_store();
        let refresh = AutoRefresh::load(store);
        let mut rx = refresh.subscribe();
        refresh.toggle()?;
        rx.changed().await?;
        assert!(rx.borrow().enabled);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_emits_each_block_once() {
        let node = Arc::new(MockNode::new());
        node.mine(2);
        let (_watcher, mut rx) = BlockWatcher::spawn(node.client(), Duration::from_secs(1));

        assert_eq!(rx.recv().await, Some(2));
        node.mine(3);
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, Some(4));
        assert_eq!(rx.recv().await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_retries_after_failures() {
        let node = Arc::new(MockNode::new());
        node.fail("eth_blockNumber", 3);
        let (_watcher, mut rx) = BlockWatcher::spawn(node.client(), Duration::from_secs(1));
        assert_eq!(rx.recv().await, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_watcher_closes_channel() {
        let node = Arc::new(MockNode::new());
        let (watcher, mut rx) = BlockWatcher::spawn(node.client(), Duration::from_secs(1));
        assert_eq!(rx.recv().await, Some(0));
        watcher.stop();
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_reload_sees_settings_saved_elsewhere() -> TestResult {
        let (_dir, store) = settings_store();
        let watcher_side = AutoRefresh::load(store.clone());
        let mut rx = watcher_side.subscribe();
        assert!(!watcher_side.reload()?);

        let other = AutoRefresh::load(store);
        other.set_enabled(true)?;
        other.set_block_watching(true)?;

        assert!(watcher_side.reload()?);
        assert!(rx.has_changed()?);
        assert!(rx.borrow_and_update().block_watching);
        assert!(!watcher_side.reload()?);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_feed_follows_watching_setting() -> TestResult {
        let (_dir, store) = settings_store();
        let node = Arc::new(MockNode::new());
        node.mine(1);
        let refresh = AutoRefresh::load(store);
        let mut rx = refresh.subscribe();
        let mut feed = BlockFeed::new(node.client(), Duration::from_secs(1));

        feed.apply(&refresh.settings());
        assert!(!feed.is_running());
        let idle = tokio::time::timeout(Duration::from_secs(5), feed.next_block()).await;
        assert!(idle.is_err());

        refresh.set_enabled(true)?;
        refresh.set_block_watching(true)?;
        rx.changed().await?;
        feed.apply(&rx.borrow_and_update());
        assert!(feed.is_running());
        assert_eq!(feed.next_block().await, 1);

        refresh.set_enabled(false)?;
        rx.changed().await?;
        feed.apply(&rx.borrow_and_update());
        assert!(!feed.is_running());
        node.mine(1);
        let idle = tokio::time::timeout(Duration::from_secs(5), feed.next_block()).await;
        assert!(idle.is_err());
        Ok(())
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut delay = Duration::from_secs(1);
        for _ in 0..10 {
            delay = next_backoff(delay);
        }
        assert_eq!(delay, MAX_BACKOFF);
        assert!(with_jitter(Duration::from_secs(4)) <= Duration::from_secs(5));
    }
}
