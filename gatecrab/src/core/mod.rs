//! Core components of the gatecrab library
//!
//! This module contains the fundamental building blocks:
//! - [`clock`]: Injectable time source
//! - [`random`]: Secure random byte source used to mint tokens
//! - [`store`]: The sharded TTL entry store (counting and claimable entries)
//! - [`quota`]: Fixed-window quota policy and named presets
//! - [`token`]: Single-use anti-replay token policy
//! - [`backstop`]: Durable persistence collaborator and the write-through token service
//! - [`sweeper`]: Periodic background purge of expired entries

pub mod backstop;
pub mod clock;
pub mod quota;
pub mod random;
pub mod store;
#[cfg(feature = "sweeper")]
pub mod sweeper;
pub mod token;

pub use backstop::{BackstopLookup, MemoryBackstop, TokenBackstop, TokenRecord, TokenService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use quota::{MAX_QUOTA_WINDOW, QuotaConfig, QuotaExceeded, QuotaPolicy, QuotaPreset};
pub use random::{OsRandom, RandomSource};
pub use store::{
    ClaimOutcome, ClaimedToken, Consume, EntryStore, EntryStoreBuilder, IssuedToken, MetaValue,
    Metadata, QuotaState,
};
#[cfg(feature = "sweeper")]
pub use sweeper::{SweepObserver, Sweeper, SweeperHandle};
pub use token::{MintedToken, PresentedToken, TokenPolicy, TokenPurpose, TokenRejection};

/// Errors that can occur while building or operating the store
///
/// Normal policy outcomes (a denied quota, an expired or replayed token) are
/// never reported through this type; they are returned as values.
///
/// # Example
///
/// ```
/// use gatecrab::{EntryStore, GateError};
///
/// match EntryStore::builder().shards(0).build() {
///     Err(GateError::InvalidConfig(msg)) => println!("rejected: {msg}"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Builder or policy parameters are invalid (zero shards, zero window, ...)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The random source kept producing tokens that collide with live entries
    #[error("could not mint a unique token after {0} attempts")]
    TokenCollision(u32),

    /// The persistence backstop failed
    #[error("backstop error: {0}")]
    Backstop(String),
}

/// Shortened token used in log events; never log a full token
pub(crate) fn fingerprint(token: &str) -> &str {
    const PREFIX_LEN: usize = 8;
    match token.char_indices().nth(PREFIX_LEN) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
