use std::collections::BTreeMap;
use std::time::SystemTime;

/// Opaque caller-supplied metadata carried on claimable entries
///
/// The store never interprets it; it is handed back on a successful claim.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A primitive metadata value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

pub(crate) struct Entry {
    pub(crate) expires_at: SystemTime,
    pub(crate) state: EntryState,
}

pub(crate) enum EntryState {
    Counting { count: u64 },
    Claimable(Box<ClaimableEntry>),
}

pub(crate) struct ClaimableEntry {
    pub(crate) subject: String,
    pub(crate) purpose: String,
    pub(crate) metadata: Metadata,
    pub(crate) created_at: SystemTime,
    pub(crate) claimed_at: Option<SystemTime>,
}

impl Entry {
    pub(crate) fn counting(expires_at: SystemTime) -> Self {
        Entry {
            expires_at,
            state: EntryState::Counting { count: 1 },
        }
    }

    pub(crate) fn claimable(expires_at: SystemTime, claimable: ClaimableEntry) -> Self {
        Entry {
            expires_at,
            state: EntryState::Claimable(Box::new(claimable)),
        }
    }

    /// An entry at or past its expiry is logically absent
    #[inline]
    pub(crate) fn is_live(&self, now: SystemTime) -> bool {
        self.expires_at > now
    }
}

/// Snapshot of a quota window after a consume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    /// Maximum operations allowed in the window
    pub limit: u64,
    /// Operations still available in the current window
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: SystemTime,
}

/// Result of [`EntryStore::try_consume`](super::EntryStore::try_consume)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consume {
    Allowed(QuotaState),
    Denied(QuotaState),
}

impl Consume {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Consume::Allowed(_))
    }

    pub fn state(&self) -> &QuotaState {
        match self {
            Consume::Allowed(state) | Consume::Denied(state) => state,
        }
    }
}

/// A token just written to the store, with the times recorded on its entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
}

/// Data handed back by a successful claim
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedToken {
    pub subject: String,
    pub purpose: String,
    pub metadata: Metadata,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub claimed_at: SystemTime,
}

/// Result of [`EntryStore::claim`](super::EntryStore::claim)
///
/// Every variant other than `Claimed` is a terminal failure for that token.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(ClaimedToken),
    /// No claimable entry exists under this token (never minted or already purged)
    NotFound,
    /// The entry outlived its expiry; reported even if it was claimed earlier
    Expired,
    /// Second presentation of a live token: a replay
    AlreadyClaimed,
    /// The caller expected a different subject; the token stays unclaimed
    SubjectMismatch,
}
