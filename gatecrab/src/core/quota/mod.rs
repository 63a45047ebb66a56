//! Fixed-window quota policy
//!
//! A [`QuotaPolicy`] binds a name and a [`QuotaConfig`] to a shared
//! [`EntryStore`]. Each caller key gets `max_requests` operations per window;
//! the window starts on the first operation and is never extended.

mod preset;

pub use preset::QuotaPreset;

use super::GateError;
use super::store::{Consume, EntryStore};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Longest window [`QuotaConfig::new`] accepts: one year
pub const MAX_QUOTA_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Window length and operation budget for a quota
///
/// # Examples
///
/// ```
/// use gatecrab::QuotaConfig;
/// use std::time::Duration;
///
/// // 5 login attempts per 15 minutes
/// let login = QuotaConfig::new(5, Duration::from_secs(15 * 60)).unwrap();
/// assert_eq!(login.max_requests(), 5);
///
/// // 30 searches per minute
/// let search = QuotaConfig::per_minute(30);
/// assert_eq!(search.window(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    max_requests: u64,
    window: Duration,
}

impl QuotaConfig {
    /// Create a validated config
    ///
    /// # Errors
    ///
    /// [`GateError::InvalidConfig`] if either value is zero or the window is
    /// longer than [`MAX_QUOTA_WINDOW`].
    pub fn new(max_requests: u64, window: Duration) -> Result<Self, GateError> {
        if max_requests == 0 {
            return Err(GateError::InvalidConfig(
                "quota max_requests must be greater than 0".into(),
            ));
        }
        if window.is_zero() {
            return Err(GateError::InvalidConfig(
                "quota window must be greater than 0".into(),
            ));
        }
        if window > MAX_QUOTA_WINDOW {
            return Err(GateError::InvalidConfig(format!(
                "quota window of {}s exceeds the {}s maximum",
                window.as_secs(),
                MAX_QUOTA_WINDOW.as_secs()
            )));
        }
        Ok(QuotaConfig {
            max_requests,
            window,
        })
    }

    /// `n` operations per minute. A zero count denies everything.
    pub const fn per_minute(n: u64) -> Self {
        QuotaConfig {
            max_requests: n,
            window: Duration::from_secs(60),
        }
    }

    /// `n` operations per hour. A zero count denies everything.
    pub const fn per_hour(n: u64) -> Self {
        QuotaConfig {
            max_requests: n,
            window: Duration::from_secs(3600),
        }
    }

    pub(crate) const fn from_parts(max_requests: u64, window: Duration) -> Self {
        QuotaConfig {
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Returned by [`QuotaPolicy::with_limit`] when the key has no budget left
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {policy}, try again in {retry_after_secs} seconds")]
pub struct QuotaExceeded {
    pub policy: String,
    pub retry_after_secs: u64,
}

/// Named quota over a shared entry store
///
/// Cloning is cheap; clones share the same store.
///
/// # Example
///
/// ```
/// use gatecrab::{EntryStore, QuotaPolicy, QuotaPreset};
/// use std::sync::Arc;
///
/// let store = Arc::new(EntryStore::new());
/// let login = QuotaPolicy::from_preset(store, QuotaPreset::Login);
///
/// for _ in 0..5 {
///     assert!(login.check_limit("alice"));
/// }
/// assert!(!login.check_limit("alice"));
/// assert_eq!(login.remaining("alice"), 0);
/// assert!(login.check_limit("bob"));
/// ```
#[derive(Clone)]
pub struct QuotaPolicy {
    name: Arc<str>,
    config: QuotaConfig,
    store: Arc<EntryStore>,
}

impl QuotaPolicy {
    pub fn new(store: Arc<EntryStore>, name: impl Into<String>, config: QuotaConfig) -> Self {
        QuotaPolicy {
            name: Arc::from(name.into()),
            config,
            store,
        }
    }

    pub fn from_preset(store: Arc<EntryStore>, preset: QuotaPreset) -> Self {
        Self::new(store, preset.name(), preset.config())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> QuotaConfig {
        self.config
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("ratelimit:{}:{key}", self.name)
    }

    /// Consume one operation and report whether it was allowed
    pub fn check_limit(&self, key: &str) -> bool {
        self.try_acquire(key).is_allowed()
    }

    /// Consume one operation, returning the full decision
    pub fn try_acquire(&self, key: &str) -> Consume {
        self.store.try_consume(
            &self.scoped_key(key),
            self.config.window,
            self.config.max_requests,
        )
    }

    /// Operations left for `key` without consuming one
    pub fn remaining(&self, key: &str) -> u64 {
        self.store
            .remaining(&self.scoped_key(key), self.config.max_requests)
    }

    /// End of the current window for `key`, if one is open
    pub fn reset_at(&self, key: &str) -> Option<SystemTime> {
        self.store.reset_at(&self.scoped_key(key))
    }

    /// Whole seconds until the current window for `key` ends, rounded up
    pub fn seconds_until_reset(&self, key: &str) -> u64 {
        self.reset_at(key)
            .map(|at| seconds_until(self.store.now(), at))
            .unwrap_or(0)
    }

    /// Administrative override: forget the window for `key`
    pub fn reset(&self, key: &str) {
        self.store.reset(&self.scoped_key(key));
    }

    /// Run `f` only if `key` still has budget
    ///
    /// One operation is consumed before `f` is polled. When the key is out
    /// of budget `f` is never called and the error carries the seconds until
    /// the window resets. `f`'s own result is returned untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use gatecrab::{EntryStore, QuotaConfig, QuotaExceeded, QuotaPolicy};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let store = Arc::new(EntryStore::new());
    /// let policy = QuotaPolicy::new(store, "export", QuotaConfig::per_hour(1));
    ///
    /// let first: Result<u32, QuotaExceeded> =
    ///     policy.with_limit("alice", || async { Ok(7) }).await;
    /// assert_eq!(first, Ok(7));
    ///
    /// let second: Result<u32, QuotaExceeded> =
    ///     policy.with_limit("alice", || async { Ok(7) }).await;
    /// assert!(second.is_err());
    /// # });
    /// ```
    pub async fn with_limit<F, Fut, T, E>(&self, key: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<QuotaExceeded>,
    {
        if let Consume::Denied(state) = self.try_acquire(key) {
            return Err(QuotaExceeded {
                policy: self.name.to_string(),
                retry_after_secs: seconds_until(self.store.now(), state.reset_at),
            }
            .into());
        }

        f().await
    }
}

fn seconds_until(now: SystemTime, at: SystemTime) -> u64 {
    match at.duration_since(now) {
        Ok(d) => d.as_secs() + u64::from(d.subsec_nanos() > 0),
        Err(_) => 0,
    }
}
