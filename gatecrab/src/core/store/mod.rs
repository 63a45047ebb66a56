//! Sharded TTL entry store
//!
//! [`EntryStore`] maps string keys to short-lived entries of two kinds:
//!
//! - **Counting** entries back fixed-window quotas ([`EntryStore::try_consume`])
//! - **Claimable** entries back single-use tokens ([`EntryStore::create_token`],
//!   [`EntryStore::claim`])
//!
//! Keys are partitioned across shards, each guarded by its own mutex. Every
//! public operation locks exactly one shard for a single lookup-and-mutate
//! step, so two calls on the same key are strictly serialized while calls on
//! keys in different shards proceed in parallel.
//!
//! Expiry is fixed at creation and never extended. An entry at or past its
//! expiry is treated as absent by every operation and is physically removed
//! by [`EntryStore::sweep`].

mod entry;
mod shard;

#[cfg(test)]
mod tests;

pub use entry::{
    ClaimOutcome, ClaimedToken, Consume, IssuedToken, MetaValue, Metadata, QuotaState,
};

use super::clock::{Clock, SystemClock};
use super::random::{OsRandom, RandomSource, random_token};
use super::{GateError, fingerprint};
use entry::{ClaimableEntry, Entry, EntryState};
use shard::Shard;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::RandomState;
#[cfg(not(feature = "ahash"))]
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const SHARDS_PER_CPU: usize = 4;
const MAX_MINT_ATTEMPTS: u32 = 10;

/// Concurrent keyed store of counting and claimable entries
///
/// The store is `Send + Sync`; share it through an [`Arc`].
///
/// # Example
///
/// ```
/// use gatecrab::{ClaimOutcome, EntryStore, Metadata};
/// use std::time::Duration;
///
/// let store = EntryStore::new();
///
/// // Two operations per minute
/// let window = Duration::from_secs(60);
/// assert!(store.try_consume("export:alice", window, 2).is_allowed());
/// assert!(store.try_consume("export:alice", window, 2).is_allowed());
/// assert!(!store.try_consume("export:alice", window, 2).is_allowed());
///
/// // Single-use token
/// let token = store
///     .create_token("user-42", "badge", Duration::from_secs(300), Metadata::new())
///     .unwrap();
/// assert!(matches!(store.claim(&token, None), ClaimOutcome::Claimed(_)));
/// assert_eq!(store.claim(&token, None), ClaimOutcome::AlreadyClaimed);
/// ```
pub struct EntryStore {
    shards: Box<[Shard]>,
    hasher: RandomState,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

/// Builder for configuring an EntryStore
///
/// The system clock and the OS random source are used unless replaced, so a
/// store can never be built without either.
///
/// # Example
///
/// ```
/// use gatecrab::{EntryStore, ManualClock};
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::starting_now());
/// let store = EntryStore::builder()
///     .shards(16)
///     .capacity(100_000)
///     .clock(clock.clone())
///     .build()
///     .unwrap();
/// ```
pub struct EntryStoreBuilder {
    shards: Option<usize>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl EntryStore {
    /// Create a store with default settings: system clock, OS randomness,
    /// and four shards per available CPU
    pub fn new() -> Self {
        EntryStore::assemble(
            default_shard_count(),
            DEFAULT_CAPACITY,
            Arc::new(SystemClock),
            Arc::new(OsRandom),
        )
    }

    pub fn builder() -> EntryStoreBuilder {
        EntryStoreBuilder::default()
    }

    fn assemble(
        shard_count: usize,
        capacity: usize,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        // Pre-allocate with overhead to avoid rehashing
        let per_shard =
            ((capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize).div_ceil(shard_count);
        let shards = (0..shard_count)
            .map(|_| Shard::with_capacity(per_shard))
            .collect();

        EntryStore {
            shards,
            hasher: RandomState::new(),
            clock,
            random,
        }
    }

    /// Current time as seen by this store's clock
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        let index = (BuildHasher::hash_one(&self.hasher, key) as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Consume one operation from the fixed window under `key`
    ///
    /// Opens a fresh window (count 1, expiring `window` from now) when there
    /// is no live entry. Otherwise increments the count while it is below
    /// `max_requests`, and denies without mutating once it is not.
    pub fn try_consume(&self, key: &str, window: Duration, max_requests: u64) -> Consume {
        let now = self.clock.now();
        let mut entries = self.shard(key).entries.lock();

        if let Some(entry) = entries.get_mut(key).filter(|entry| entry.is_live(now)) {
            let reset_at = entry.expires_at;
            return match &mut entry.state {
                EntryState::Counting { count } if *count < max_requests => {
                    *count += 1;
                    Consume::Allowed(QuotaState {
                        limit: max_requests,
                        remaining: max_requests - *count,
                        reset_at,
                    })
                }
                EntryState::Counting { count } => {
                    tracing::warn!(key, count = *count, limit = max_requests, "quota exceeded");
                    Consume::Denied(QuotaState {
                        limit: max_requests,
                        remaining: 0,
                        reset_at,
                    })
                }
                EntryState::Claimable(_) => {
                    tracing::warn!(key, "quota key is held by a claimable entry");
                    Consume::Denied(QuotaState {
                        limit: max_requests,
                        remaining: 0,
                        reset_at,
                    })
                }
            };
        }

        if max_requests == 0 {
            tracing::warn!(key, count = 0, limit = 0, "quota exceeded");
            return Consume::Denied(QuotaState {
                limit: 0,
                remaining: 0,
                reset_at: now,
            });
        }

        // Absent or expired: start a fresh window
        let Some(reset_at) = now.checked_add(window) else {
            tracing::warn!(key, window_secs = window.as_secs(), "quota window out of range");
            return Consume::Denied(QuotaState {
                limit: max_requests,
                remaining: 0,
                reset_at: now,
            });
        };
        entries.insert(key.to_string(), Entry::counting(reset_at));
        Consume::Allowed(QuotaState {
            limit: max_requests,
            remaining: max_requests - 1,
            reset_at,
        })
    }

    /// Operations left in the live window under `key`, without consuming
    pub fn remaining(&self, key: &str, max_requests: u64) -> u64 {
        let now = self.clock.now();
        let entries = self.shard(key).entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.state {
                EntryState::Counting { count } => max_requests.saturating_sub(*count),
                EntryState::Claimable(_) => 0,
            },
            _ => max_requests,
        }
    }

    /// Expiry of the live entry under `key`
    pub fn reset_at(&self, key: &str) -> Option<SystemTime> {
        let now = self.clock.now();
        let entries = self.shard(key).entries.lock();

        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at)
    }

    /// Remove whatever lives under `key`. Removing a missing key is a no-op.
    pub fn reset(&self, key: &str) {
        if self.shard(key).entries.lock().remove(key).is_some() {
            tracing::debug!(key, "entry reset");
        }
    }

    /// Mint a fresh single-use token and return it
    ///
    /// Shorthand for [`EntryStore::issue_token`] when only the token string
    /// is needed.
    pub fn create_token(
        &self,
        subject: impl Into<String>,
        purpose: impl Into<String>,
        ttl: Duration,
        metadata: Metadata,
    ) -> Result<String, GateError> {
        self.issue_token(subject, purpose, ttl, metadata)
            .map(|issued| issued.token)
    }

    /// Mint a fresh single-use token
    ///
    /// The token is 32 bytes from the store's random source, hex encoded.
    /// The entry expires `ttl` from now and starts unclaimed. The returned
    /// times are the ones stored on the entry.
    ///
    /// # Errors
    ///
    /// - [`GateError::InvalidConfig`] if `now + ttl` is not representable
    /// - [`GateError::TokenCollision`] if the random source keeps producing
    ///   tokens that are already live
    pub fn issue_token(
        &self,
        subject: impl Into<String>,
        purpose: impl Into<String>,
        ttl: Duration,
        metadata: Metadata,
    ) -> Result<IssuedToken, GateError> {
        let now = self.clock.now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            GateError::InvalidConfig(format!("token ttl of {}s is out of range", ttl.as_secs()))
        })?;
        let claimable = ClaimableEntry {
            subject: subject.into(),
            purpose: purpose.into(),
            metadata,
            created_at: now,
            claimed_at: None,
        };

        for _ in 0..MAX_MINT_ATTEMPTS {
            let token = random_token(self.random.as_ref());

            let mut entries = self.shard(&token).entries.lock();
            if entries.get(&token).is_some_and(|entry| entry.is_live(now)) {
                tracing::warn!(
                    token = fingerprint(&token),
                    "minted token collides with a live entry"
                );
                continue;
            }

            tracing::debug!(
                token = fingerprint(&token),
                subject = %claimable.subject,
                purpose = %claimable.purpose,
                "token minted"
            );
            entries.insert(token.clone(), Entry::claimable(expires_at, claimable));
            return Ok(IssuedToken {
                token,
                issued_at: now,
                expires_at,
            });
        }

        Err(GateError::TokenCollision(MAX_MINT_ATTEMPTS))
    }

    /// Claim a token exactly once
    ///
    /// Expiry is checked before the claimed flag, so a token presented after
    /// its expiry reports [`ClaimOutcome::Expired`] whether or not it was used.
    /// When `expected_subject` is given and differs from the stored subject
    /// the token is left unclaimed.
    pub fn claim(&self, token: &str, expected_subject: Option<&str>) -> ClaimOutcome {
        let now = self.clock.now();
        let mut entries = self.shard(token).entries.lock();

        let Some(entry) = entries.get_mut(token) else {
            tracing::debug!(token = fingerprint(token), "token not found");
            return ClaimOutcome::NotFound;
        };

        let expires_at = entry.expires_at;
        let EntryState::Claimable(claimable) = &mut entry.state else {
            return ClaimOutcome::NotFound;
        };

        if expires_at <= now {
            tracing::debug!(token = fingerprint(token), "token expired");
            return ClaimOutcome::Expired;
        }

        if claimable.claimed_at.is_some() {
            tracing::warn!(
                token = fingerprint(token),
                subject = %claimable.subject,
                "token already claimed, possible replay attack"
            );
            return ClaimOutcome::AlreadyClaimed;
        }

        if expected_subject.is_some_and(|expected| expected != claimable.subject) {
            tracing::warn!(
                token = fingerprint(token),
                subject = %claimable.subject,
                presented = expected_subject.unwrap_or_default(),
                "token presented for a different subject"
            );
            return ClaimOutcome::SubjectMismatch;
        }

        claimable.claimed_at = Some(now);
        ClaimOutcome::Claimed(ClaimedToken {
            subject: claimable.subject.clone(),
            purpose: claimable.purpose.clone(),
            metadata: claimable.metadata.clone(),
            created_at: claimable.created_at,
            expires_at,
            claimed_at: now,
        })
    }

    /// Remove every entry at or past its expiry
    ///
    /// Shards are purged one at a time under the same lock regular operations
    /// take, so no entry disappears in the middle of a claim.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        self.shards
            .iter()
            .map(|shard| shard.purge_expired(now))
            .sum()
    }

    /// Number of entries held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn default_shard_count() -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    cpu_count * SHARDS_PER_CPU
}

impl Default for EntryStoreBuilder {
    fn default() -> Self {
        Self {
            shards: None,
            capacity: DEFAULT_CAPACITY,
            clock: Arc::new(SystemClock),
            random: Arc::new(OsRandom),
        }
    }
}

impl EntryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of lock partitions
    ///
    /// Defaults to four per available CPU.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Set the expected number of live keys
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Build the EntryStore with the configured settings
    ///
    /// # Errors
    ///
    /// [`GateError::InvalidConfig`] if the shard count is zero.
    pub fn build(self) -> Result<EntryStore, GateError> {
        let shard_count = match self.shards {
            Some(0) => {
                return Err(GateError::InvalidConfig(
                    "shard count must be greater than 0".into(),
                ));
            }
            Some(n) => n,
            None => default_shard_count(),
        };

        Ok(EntryStore::assemble(
            shard_count,
            self.capacity,
            self.clock,
            self.random,
        ))
    }
}
