//! Load/download progress table and its polling subscription.
//!
//! One record per model identifier. Writers merge partial updates under a
//! single lock, so concurrent writers for the same key never interleave their
//! read-modify-write. Records that reach a terminal status are reaped after a
//! fixed delay whether or not anyone is subscribed.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ProgressConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Downloading,
    Loading,
    Ready,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

/// Snapshot of one model's load state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub status: ProgressStatus,
    /// Percentage in `0..=100`
    pub progress: u8,
    pub message: String,
    /// Unix time of the last write, in milliseconds
    pub timestamp: u64,
}

impl ProgressRecord {
    /// Record reported to subscribers before anything was written for their key.
    pub fn pending() -> Self {
        Self {
            status: ProgressStatus::Loading,
            progress: 0,
            message: "Preparing model download...".to_string(),
            timestamp: now_millis(),
        }
    }

    fn blank() -> Self {
        Self {
            status: ProgressStatus::Loading,
            progress: 0,
            message: String::new(),
            timestamp: now_millis(),
        }
    }
}

/// Partial write; `None` fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub status: Option<ProgressStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

impl ProgressUpdate {
    pub fn status(status: ProgressStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn apply(self, record: &mut ProgressRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(progress) = self.progress {
            record.progress = progress.min(100);
        }
        if let Some(message) = self.message {
            record.message = message;
        }
        record.timestamp = now_millis();
    }
}

struct Entry {
    record: ProgressRecord,
    generation: u64,
}

type Table = Arc<Mutex<HashMap<String, Entry>>>;

/// Shared progress table with automatic reaping of terminal records.
pub struct ProgressTracker {
    config: ProgressConfig,
    records: Table,
    generation: AtomicU64,
    reapers: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl ProgressTracker {
    pub fn new(config: ProgressConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            records: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            reapers: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Merge `update` into the record for `key`, creating it if needed.
    ///
    /// The generation stamp and, for terminal records, the reaper registration
    /// happen under the records lock, so the last writer's reaper is the live one.
    pub fn update(&self, key: &str, update: ProgressUpdate) -> ProgressRecord {
        let mut records = lock(&self.records);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = records.entry(key.to_string()).or_insert_with(|| Entry {
            record: ProgressRecord::blank(),
            generation,
        });
        update.apply(&mut entry.record);
        entry.generation = generation;
        let merged = entry.record.clone();

        debug!(
            "Progress {}: {:?} {}% {}",
            key, merged.status, merged.progress, merged.message
        );

        if merged.status.is_terminal() {
            let delay = match merged.status {
                ProgressStatus::Error => self.config.error_reap(),
                _ => self.config.ready_reap(),
            };
            self.schedule_reap(key, generation, delay);
        }
        drop(records);

        merged
    }

    pub fn get(&self, key: &str) -> Option<ProgressRecord> {
        lock(&self.records).get(key).map(|entry| entry.record.clone())
    }

    pub fn clear(&self, key: &str) {
        lock(&self.records).remove(key);
        if let Some(reaper) = lock(&self.reapers).remove(key) {
            reaper.abort();
        }
    }

    /// All current records, unordered.
    pub fn snapshot(&self) -> Vec<(String, ProgressRecord)> {
        lock(&self.records)
            .iter()
            .map(|(key, entry)| (key.clone(), entry.record.clone()))
            .collect()
    }

    /// Stream of snapshots for `key`.
    ///
    /// Yields the current record (or [`ProgressRecord::pending`]) at once, then
    /// the stored record every poll interval while one exists. After a terminal
    /// record is yielded the stream waits the close grace period and ends.
    /// Dropping the stream stops the polling; it owns no background task.
    pub fn subscribe(&self, key: &str) -> impl Stream<Item = ProgressRecord> + Send + 'static {
        let records = self.records.clone();
        let key = key.to_string();
        let poll = self.config.poll_interval();
        let grace = self.config.close_grace();
        let mut shutdown = self.shutdown.subscribe();

        async_stream::stream! {
            let initial = lock(&records)
                .get(&key)
                .map(|entry| entry.record.clone())
                .unwrap_or_else(ProgressRecord::pending);
            yield initial;

            if *shutdown.borrow() {
                return;
            }

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + poll, poll);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }

                let current = lock(&records).get(&key).map(|entry| entry.record.clone());
                if let Some(record) = current {
                    let terminal = record.status.is_terminal();
                    yield record;
                    if terminal {
                        tokio::time::sleep(grace).await;
                        break;
                    }
                }
            }
        }
    }

    /// Stop pending reapers and end open subscriptions.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        for (_, reaper) in lock(&self.reapers).drain() {
            reaper.abort();
        }
    }

    /// Called with the records lock held; lock order is records, then reapers.
    fn schedule_reap(&self, key: &str, generation: u64, delay: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; terminal progress for {} will not be reaped", key);
            return;
        };

        let records = self.records.clone();
        let owned_key = key.to_string();
        let reaper = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut records = lock(&records);
            // A newer write means the record started a new lifecycle.
            if records
                .get(&owned_key)
                .is_some_and(|entry| entry.generation == generation)
            {
                records.remove(&owned_key);
                debug!("Reaped progress record for {}", owned_key);
            }
        });

        if let Some(previous) = lock(&self.reapers).insert(key.to_string(), reaper) {
            previous.abort();
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::time::Instant;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(ProgressConfig::default())
    }

    #[test]
    fn partial_updates_merge_without_field_loss() {
        let tracker = tracker();
        tracker.update(
            "m",
            ProgressUpdate::status(ProgressStatus::Downloading).with_message("x"),
        );
        let merged = tracker.update("m", ProgressUpdate::progress(50));
        assert_eq!(merged.status, ProgressStatus::Downloading);
        assert_eq!(merged.progress, 50);
        assert_eq!(merged.message, "x");
        assert_eq!(tracker.get("m"), Some(merged));
    }

    #[test]
    fn first_write_creates_defaults() {
        let tracker = tracker();
        let record = tracker.update("fresh", ProgressUpdate::progress(250));
        assert_eq!(record.status, ProgressStatus::Loading);
        assert_eq!(record.progress, 100);
        assert!(record.message.is_empty());
    }

    #[test]
    fn clear_removes_record() {
        let tracker = tracker();
        tracker.update("m", ProgressUpdate::progress(10));
        tracker.clear("m");
        assert!(tracker.get("m").is_none());
        assert!(tracker.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ready_records_are_reaped_after_success_delay() {
        let tracker = tracker();
        tracker.update("m", ProgressUpdate::status(ProgressStatus::Ready).with_progress(100));

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(tracker.get("m").is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(tracker.get("m").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn error_records_live_for_error_delay() {
        let tracker = tracker();
        tracker.update("m", ProgressUpdate::status(ProgressStatus::Error).with_message("boom"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(tracker.get("m").unwrap().message, "boom");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(tracker.get("m").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_write_cancels_pending_reap() {
        let tracker = tracker();
        tracker.update("m", ProgressUpdate::status(ProgressStatus::Ready));
        tokio::time::sleep(Duration::from_secs(1)).await;
        tracker.update("m", ProgressUpdate::status(ProgressStatus::Downloading).with_progress(5));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let record = tracker.get("m").unwrap();
        assert_eq!(record.status, ProgressStatus::Downloading);
    }

    #[test]
    fn concurrent_writers_keep_every_field() {
        let tracker = Arc::new(tracker());
        tracker.update(
            "m",
            ProgressUpdate::status(ProgressStatus::Downloading).with_message("x"),
        );

        let writers: Vec<_> = (1..=8u8)
            .map(|worker| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for step in 0..200u8 {
                        tracker.update("m", ProgressUpdate::progress(worker * 10 + step % 10));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let record = tracker.get("m").unwrap();
        assert_eq!(record.status, ProgressStatus::Downloading);
        assert_eq!(record.message, "x");
        assert!((10..=89).contains(&record.progress));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_terminal_writes_are_all_reaped() {
        let tracker = Arc::new(ProgressTracker::new(ProgressConfig {
            ready_reap_ms: 20,
            ..ProgressConfig::default()
        }));
        let keys = 500;
        let barrier = Arc::new(tokio::sync::Barrier::new(keys * 2));

        let writers: Vec<_> = (0..keys * 2)
            .map(|n| {
                let tracker = tracker.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    tracker.update(
                        &format!("model-{}", n / 2),
                        ProgressUpdate::status(ProgressStatus::Ready).with_progress(100),
                    );
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        let survivors = tracker.snapshot();
        assert!(survivors.is_empty(), "unreaped: {}", survivors.len());
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_starts_with_pending_record() {
        let tracker = tracker();
        let stream = tracker.subscribe("unknown");
        tokio::pin!(stream);

        let first = stream.next().await.unwrap();
        assert_eq!(first.status, ProgressStatus::Loading);
        assert_eq!(first.progress, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_polls_and_closes_after_terminal() {
        let tracker = tracker();
        tracker.update("m", ProgressUpdate::status(ProgressStatus::Downloading).with_progress(10));

        let stream = tracker.subscribe("m");
        tokio::pin!(stream);

        let first = stream.next().await.unwrap();
        assert_eq!(first.progress, 10);

        let started = Instant::now();
        let second = stream.next().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(second.status, ProgressStatus::Downloading);

        tracker.update("m", ProgressUpdate::status(ProgressStatus::Ready).with_progress(100));
        let last = stream.next().await.unwrap();
        assert_eq!(last.status, ProgressStatus::Ready);

        let closing = Instant::now();
        assert!(stream.next().await.is_none());
        assert!(closing.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_open_subscriptions() {
        let tracker = tracker();
        let stream = tracker.subscribe("idle");
        tokio::pin!(stream);
        stream.next().await.unwrap();

        tracker.shutdown();
        assert!(stream.next().await.is_none());
    }
}
