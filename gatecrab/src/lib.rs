//! # GateCrab
//!
//! Ephemeral keyed state for abuse protection: fixed-window quotas and
//! single-use anti-replay tokens over one sharded, TTL-bounded store.
//!
//! ## Overview
//!
//! GateCrab keeps short-lived entries under string keys:
//! - **Counting entries** back fixed-window quotas: N operations per window,
//!   the window opening on the first operation and never extending
//! - **Claimable entries** back single-use tokens: random 256-bit tokens bound
//!   to a subject and a purpose that can be claimed exactly once
//! - **Expiry** is fixed at creation; expired entries are invisible at once
//!   and reclaimed by a periodic sweep
//!
//! ## Quick Start
//!
//! ```
//! use gatecrab::{EntryStore, QuotaPolicy, QuotaPreset};
//! use std::sync::Arc;
//!
//! let store = Arc::new(EntryStore::new());
//! let login = QuotaPolicy::from_preset(store, QuotaPreset::Login);
//!
//! if login.check_limit("alice") {
//!     println!("Attempt allowed, {} left", login.remaining("alice"));
//! } else {
//!     println!("Try again in {} seconds", login.seconds_until_reset("alice"));
//! }
//! ```
//!
//! ## Single-use tokens
//!
//! ```
//! use gatecrab::{EntryStore, Metadata, TokenPolicy, TokenPurpose, TokenRejection};
//! use std::sync::Arc;
//!
//! let tokens = TokenPolicy::new(Arc::new(EntryStore::new()));
//!
//! // Embed `minted.token`, the subject, purpose and `issued_at` in a QR code
//! let minted = tokens.mint("user-42", TokenPurpose::CheckIn, Metadata::new())?;
//!
//! // At the door: the first scan wins, every later scan is a replay
//! let presented = minted.presentation();
//! assert!(tokens.validate(&presented).is_ok());
//! let replay = tokens.validate(&presented).unwrap_err();
//! assert!(replay.is_replay());
//! println!("{}", replay.public_message());
//! # Ok::<(), gatecrab::GateError>(())
//! ```
//!
//! ## Quota presets
//!
//! | preset         | budget             |
//! |----------------|--------------------|
//! | `login`        | 5 per 15 minutes   |
//! | `registration` | 3 per hour         |
//! | `export`       | 3 per hour         |
//! | `search`       | 30 per minute      |
//! | `upload`       | 10 per hour        |
//! | `api`          | 100 per minute     |
//!
//! ## Thread Safety
//!
//! [`EntryStore`] is `Send + Sync` and meant to be shared through an
//! [`Arc`](std::sync::Arc). Operations on one key are serialized by the lock
//! of the shard owning it; keys in different shards never contend.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing
//! - `sweeper` (default): Background [`Sweeper`] task on tokio
//! - `serde`: Serialize and deserialize the public value types

pub mod core;

pub use core::{
    BackstopLookup, ClaimOutcome, ClaimedToken, Clock, Consume, EntryStore, EntryStoreBuilder,
    GateError, IssuedToken, MAX_QUOTA_WINDOW, ManualClock, MemoryBackstop, MetaValue, Metadata,
    MintedToken, OsRandom, PresentedToken, QuotaConfig, QuotaExceeded, QuotaPolicy, QuotaPreset,
    QuotaState, RandomSource, SystemClock, TokenBackstop, TokenPolicy, TokenPurpose, TokenRecord,
    TokenRejection, TokenService,
};
#[cfg(feature = "sweeper")]
pub use core::{SweepObserver, Sweeper, SweeperHandle};

// Re-export the store module so benchmarks can access it
pub use crate::core::store;
