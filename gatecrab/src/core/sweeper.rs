//! Periodic purge of expired entries
//!
//! Expired entries are already invisible to every store operation; the
//! sweeper only reclaims their memory. It runs as one tokio task owned by a
//! [`SweeperHandle`]. Dropping the handle cancels the task.

use super::backstop::TokenBackstop;
use super::store::EntryStore;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Callback invoked with the number of entries removed by each sweep
pub type SweepObserver = Arc<dyn Fn(usize) + Send + Sync>;

/// Configures and starts the background sweep task
///
/// # Example
///
/// ```
/// use gatecrab::{EntryStore, Sweeper};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let store = Arc::new(EntryStore::new());
/// let handle = Sweeper::new(store)
///     .interval(Duration::from_secs(30))
///     .spawn();
///
/// handle.stop().await;
/// # });
/// ```
pub struct Sweeper {
    store: Arc<EntryStore>,
    interval: Duration,
    backstop: Option<Arc<dyn TokenBackstop>>,
    observer: Option<SweepObserver>,
}

impl Sweeper {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Sweeper {
            store,
            interval: DEFAULT_SWEEP_INTERVAL,
            backstop: None,
            observer: None,
        }
    }

    /// Time between sweeps, 60 seconds by default
    ///
    /// Zero falls back to the default and anything above a year is capped
    /// at a year.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Also delete expired records from `backstop` on every tick
    pub fn backstop(mut self, backstop: Arc<dyn TokenBackstop>) -> Self {
        self.backstop = Some(backstop);
        self
    }

    /// Report each sweep's removed count, e.g. to a metrics counter
    pub fn on_sweep(mut self, observer: SweepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Start sweeping on the current tokio runtime
    ///
    /// The first sweep happens one interval after spawning.
    pub fn spawn(self) -> SweeperHandle {
        let task = tokio::spawn(self.run());
        SweeperHandle { task: Some(task) }
    }

    fn period(&self) -> Duration {
        if self.interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else if self.interval > MAX_SWEEP_INTERVAL {
            tracing::warn!(
                requested_secs = self.interval.as_secs(),
                "sweep interval capped at one year"
            );
            MAX_SWEEP_INTERVAL
        } else {
            self.interval
        }
    }

    async fn run(self) {
        let period = self.period();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let store = &self.store;
        match std::panic::catch_unwind(AssertUnwindSafe(|| store.sweep())) {
            Ok(removed) => {
                tracing::debug!(removed, remaining = store.len(), "swept expired entries");
                if let Some(observer) = &self.observer {
                    observer(removed);
                }
            }
            Err(_) => {
                tracing::error!("store sweep panicked, retrying on next tick");
            }
        }

        if let Some(backstop) = &self.backstop {
            match backstop.delete_expired_before(store.now()).await {
                Ok(removed) => {
                    tracing::debug!(removed, "purged expired backstop records");
                }
                Err(e) => {
                    tracing::error!(error = %e, "backstop purge failed, retrying on next tick");
                }
            }
        }
    }
}

/// Owns the running sweep task
///
/// Dropping the handle aborts the task.
pub struct SweeperHandle {
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Cancel the task and wait for it to finish
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backstop::{MemoryBackstop, TokenRecord};
    use crate::core::clock::{Clock, ManualClock};
    use crate::core::store::Metadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::UNIX_EPOCH;

    fn fixture() -> (Arc<ManualClock>, Arc<EntryStore>) {
        let clock = Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_000)));
        let store = EntryStore::builder()
            .shards(4)
            .clock(clock.clone())
            .build()
            .unwrap();
        (clock, Arc::new(store))
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_sweeper_purges_in_background() {
        let (clock, store) = fixture();
        for i in 0..50 {
            store.try_consume(&format!("k{i}"), Duration::from_secs(1), 5);
        }
        store.try_consume("live", Duration::from_secs(3600), 5);
        clock.advance(Duration::from_secs(2));

        let handle = Sweeper::new(store.clone())
            .interval(Duration::from_millis(10))
            .spawn();
        assert!(handle.is_running());

        assert!(wait_for(|| store.len() == 1).await);
        assert_eq!(store.remaining("live", 5), 4);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_observer_sees_removed_counts() {
        let (clock, store) = fixture();
        for i in 0..10 {
            store.try_consume(&format!("k{i}"), Duration::from_secs(1), 1);
        }
        clock.advance(Duration::from_secs(2));

        let total = Arc::new(AtomicUsize::new(0));
        let seen = total.clone();
        let handle = Sweeper::new(store)
            .interval(Duration::from_millis(10))
            .on_sweep(Arc::new(move |removed| {
                seen.fetch_add(removed, Ordering::SeqCst);
            }))
            .spawn();

        assert!(wait_for(|| total.load(Ordering::SeqCst) == 10).await);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_sweeper_purges_backstop() {
        let (clock, store) = fixture();
        let backstop = Arc::new(MemoryBackstop::new());
        let now = clock.now();
        backstop
            .insert(TokenRecord {
                token: "old".into(),
                subject: "s".into(),
                purpose: "badge".into(),
                metadata: Metadata::new(),
                created_at: now,
                expires_at: now + Duration::from_secs(1),
            })
            .await
            .unwrap();
        clock.advance(Duration::from_secs(5));

        let handle = Sweeper::new(store)
            .interval(Duration::from_millis(10))
            .backstop(backstop.clone())
            .spawn();

        assert!(wait_for(|| backstop.is_empty()).await);
        handle.stop().await;
    }

    #[test]
    fn test_period_bounds() {
        let (_clock, store) = fixture();
        let period = |interval| Sweeper::new(store.clone()).interval(interval).period();

        assert_eq!(period(Duration::ZERO), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(period(Duration::from_secs(30)), Duration::from_secs(30));
        assert_eq!(period(Duration::MAX), MAX_SWEEP_INTERVAL);
    }

    #[tokio::test]
    async fn test_huge_interval_keeps_task_alive() {
        let (_clock, store) = fixture();
        let handle = Sweeper::new(store).interval(Duration::MAX).spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_drop_cancels_task() {
        let (clock, store) = fixture();
        let handle = Sweeper::new(store.clone())
            .interval(Duration::from_millis(10))
            .spawn();
        drop(handle);

        store.try_consume("k", Duration::from_secs(1), 1);
        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody swept the expired entry
        assert_eq!(store.len(), 1);
    }
}
