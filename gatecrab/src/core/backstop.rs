//! Durable persistence backstop for single-use tokens
//!
//! The entry store is process-local: a restart forgets every token. A
//! [`TokenBackstop`] keeps a durable copy so tokens minted before a restart
//! can still be validated exactly once afterwards. [`TokenService`] layers
//! the backstop under a [`TokenPolicy`]:
//!
//! - minting writes through to the backstop; a failed write is logged and
//!   does not fail the mint
//! - validation consults the local store first and only falls back to the
//!   backstop when the store has never heard of the token
//! - a local claim also marks the backstop record used, so a restart cannot
//!   revive a claimed token

use super::store::{ClaimedToken, Metadata};
use super::token::{MintedToken, PresentedToken, TokenPolicy, TokenPurpose, TokenRejection};
use super::{GateError, fingerprint};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

/// A token as written to durable storage
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub token: String,
    pub subject: String,
    pub purpose: String,
    pub metadata: Metadata,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl TokenRecord {
    pub fn from_minted(minted: &MintedToken, metadata: Metadata) -> Self {
        TokenRecord {
            token: minted.token.clone(),
            subject: minted.subject.clone(),
            purpose: minted.purpose.as_str().to_string(),
            metadata,
            created_at: minted.issued_at,
            expires_at: minted.expires_at,
        }
    }
}

/// Row returned by [`TokenBackstop::fetch_and_mark_used`]
///
/// `already_used` reflects the record *before* the call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackstopLookup {
    pub subject: String,
    pub purpose: String,
    pub metadata: Metadata,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub already_used: bool,
}

/// Durable token storage
#[async_trait]
pub trait TokenBackstop: Send + Sync {
    async fn insert(&self, record: TokenRecord) -> Result<(), GateError>;

    /// Fetch the record for `token` and, if it is unexpired and unused at
    /// `now`, mark it used in the same atomic step
    async fn fetch_and_mark_used(
        &self,
        token: &str,
        now: SystemTime,
    ) -> Result<Option<BackstopLookup>, GateError>;

    /// Delete every record that expired strictly before `cutoff`
    async fn delete_expired_before(&self, cutoff: SystemTime) -> Result<usize, GateError>;
}

struct StoredRecord {
    record: TokenRecord,
    used_at: Option<SystemTime>,
}

/// In-process [`TokenBackstop`]
///
/// Useful in tests and single-node deployments that only need the backstop
/// semantics, not actual durability.
#[derive(Default)]
pub struct MemoryBackstop {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl MemoryBackstop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenBackstop for MemoryBackstop {
    async fn insert(&self, record: TokenRecord) -> Result<(), GateError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.token) {
            return Err(GateError::Backstop(format!(
                "duplicate token {}",
                fingerprint(&record.token)
            )));
        }
        records.insert(
            record.token.clone(),
            StoredRecord {
                record,
                used_at: None,
            },
        );
        Ok(())
    }

    async fn fetch_and_mark_used(
        &self,
        token: &str,
        now: SystemTime,
    ) -> Result<Option<BackstopLookup>, GateError> {
        let mut records = self.records.lock();
        let Some(stored) = records.get_mut(token) else {
            return Ok(None);
        };

        let already_used = stored.used_at.is_some();
        if !already_used && stored.record.expires_at > now {
            stored.used_at = Some(now);
        }

        Ok(Some(BackstopLookup {
            subject: stored.record.subject.clone(),
            purpose: stored.record.purpose.clone(),
            metadata: stored.record.metadata.clone(),
            created_at: stored.record.created_at,
            expires_at: stored.record.expires_at,
            already_used,
        }))
    }

    async fn delete_expired_before(&self, cutoff: SystemTime) -> Result<usize, GateError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, stored| stored.record.expires_at >= cutoff);
        Ok(before - records.len())
    }
}

/// Token policy with an optional write-through backstop
///
/// # Example
///
/// ```
/// use gatecrab::{EntryStore, MemoryBackstop, Metadata, TokenPolicy, TokenPurpose, TokenService};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let backstop = Arc::new(MemoryBackstop::new());
/// let before_restart = TokenService::new(TokenPolicy::new(Arc::new(EntryStore::new())))
///     .with_backstop(backstop.clone());
/// let minted = before_restart
///     .mint("user-42", TokenPurpose::Badge, Metadata::new())
///     .await
///     .unwrap();
///
/// // A fresh process with an empty store still honors the token once
/// let after_restart = TokenService::new(TokenPolicy::new(Arc::new(EntryStore::new())))
///     .with_backstop(backstop);
/// assert!(after_restart.validate(&minted.presentation()).await.is_ok());
/// assert!(after_restart.validate(&minted.presentation()).await.is_err());
/// # });
/// ```
#[derive(Clone)]
pub struct TokenService {
    policy: TokenPolicy,
    backstop: Option<Arc<dyn TokenBackstop>>,
}

impl TokenService {
    pub fn new(policy: TokenPolicy) -> Self {
        TokenService {
            policy,
            backstop: None,
        }
    }

    pub fn with_backstop(mut self, backstop: Arc<dyn TokenBackstop>) -> Self {
        self.backstop = Some(backstop);
        self
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    pub fn backstop(&self) -> Option<&Arc<dyn TokenBackstop>> {
        self.backstop.as_ref()
    }

    pub async fn mint(
        &self,
        subject: impl Into<String>,
        purpose: TokenPurpose,
        metadata: Metadata,
    ) -> Result<MintedToken, GateError> {
        let minted = self.policy.mint(subject, purpose, metadata.clone())?;
        self.write_through(&minted, metadata).await;
        Ok(minted)
    }

    pub async fn mint_with_ttl(
        &self,
        subject: impl Into<String>,
        purpose: TokenPurpose,
        metadata: Metadata,
        ttl: std::time::Duration,
    ) -> Result<MintedToken, GateError> {
        let minted = self
            .policy
            .mint_with_ttl(subject, purpose, metadata.clone(), ttl)?;
        self.write_through(&minted, metadata).await;
        Ok(minted)
    }

    async fn write_through(&self, minted: &MintedToken, metadata: Metadata) {
        let Some(backstop) = &self.backstop else {
            return;
        };
        // The local store already holds the token; durability is best effort
        if let Err(e) = backstop
            .insert(TokenRecord::from_minted(minted, metadata))
            .await
        {
            tracing::error!(
                token = fingerprint(&minted.token),
                error = %e,
                "failed to persist token"
            );
        }
    }

    pub async fn validate(
        &self,
        presented: &PresentedToken,
    ) -> Result<ClaimedToken, TokenRejection> {
        let local = self.policy.validate(presented);

        let Some(backstop) = &self.backstop else {
            return local;
        };

        match local {
            Ok(claimed) => {
                self.mark_used(backstop.as_ref(), &presented.token, claimed.claimed_at)
                    .await;
                Ok(claimed)
            }
            Err(TokenRejection::PurposeMismatch) => {
                // Consumed locally; keep the durable copy in step
                let now = self.policy.store().now();
                self.mark_used(backstop.as_ref(), &presented.token, now)
                    .await;
                Err(TokenRejection::PurposeMismatch)
            }
            Err(TokenRejection::NotFound) => {
                self.validate_from_backstop(backstop.as_ref(), presented)
                    .await
            }
            Err(rejection) => Err(rejection),
        }
    }

    async fn mark_used(&self, backstop: &dyn TokenBackstop, token: &str, now: SystemTime) {
        if let Err(e) = backstop.fetch_and_mark_used(token, now).await {
            tracing::warn!(
                token = fingerprint(token),
                error = %e,
                "failed to mark persisted token as used"
            );
        }
    }

    async fn validate_from_backstop(
        &self,
        backstop: &dyn TokenBackstop,
        presented: &PresentedToken,
    ) -> Result<ClaimedToken, TokenRejection> {
        let now = self.policy.store().now();
        let lookup = match backstop.fetch_and_mark_used(&presented.token, now).await {
            Ok(Some(lookup)) => lookup,
            Ok(None) => return Err(TokenRejection::NotFound),
            Err(e) => {
                tracing::error!(
                    token = fingerprint(&presented.token),
                    error = %e,
                    "backstop lookup failed"
                );
                return Err(TokenRejection::NotFound);
            }
        };

        if lookup.expires_at <= now {
            tracing::debug!(token = fingerprint(&presented.token), "persisted token expired");
            return Err(TokenRejection::Expired);
        }
        if lookup.already_used {
            tracing::warn!(
                token = fingerprint(&presented.token),
                subject = %lookup.subject,
                "persisted token already used, possible replay attack"
            );
            return Err(TokenRejection::AlreadyClaimed);
        }
        if lookup.subject != presented.subject {
            tracing::warn!(
                token = fingerprint(&presented.token),
                subject = %lookup.subject,
                presented = %presented.subject,
                "persisted token presented for a different subject"
            );
            return Err(TokenRejection::SubjectMismatch);
        }
        if lookup.purpose != presented.purpose.as_str() {
            tracing::warn!(
                token = fingerprint(&presented.token),
                stored = %lookup.purpose,
                presented = %presented.purpose,
                "persisted token presented for a different purpose"
            );
            return Err(TokenRejection::PurposeMismatch);
        }

        tracing::info!(
            token = fingerprint(&presented.token),
            subject = %lookup.subject,
            purpose = %lookup.purpose,
            "token validated from backstop"
        );
        Ok(ClaimedToken {
            subject: lookup.subject,
            purpose: lookup.purpose,
            metadata: lookup.metadata,
            created_at: lookup.created_at,
            expires_at: lookup.expires_at,
            claimed_at: now,
        })
    }
}
