//! Request and response types for the HTTP API
//!
//! Timestamps on the wire are Unix epoch milliseconds, the same unit the
//! token payloads embed.

use gatecrab::{ClaimedToken, Consume, Metadata, MintedToken, TokenPurpose};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Body of `POST /quota/check`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheckRequest {
    /// Name of the quota policy (e.g. "login", "export")
    pub policy: String,
    /// Caller key within the policy (user id, IP, ...)
    pub key: String,
}

/// Quota decision
///
/// # Example
///
/// ```json
/// {
///   "allowed": false,
///   "limit": 3,
///   "remaining": 0,
///   "reset_after": 1800,
///   "retry_after": 1800
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaResponse {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the current window ends
    pub reset_after: u64,
    /// Seconds until the next operation can succeed (0 if allowed)
    pub retry_after: u64,
}

impl QuotaResponse {
    pub fn from_consume(decision: &Consume, now: SystemTime) -> Self {
        let state = decision.state();
        let reset_after = seconds_between(now, state.reset_at);
        QuotaResponse {
            allowed: decision.is_allowed(),
            limit: state.limit,
            remaining: state.remaining,
            reset_after,
            retry_after: if decision.is_allowed() { 0 } else { reset_after },
        }
    }
}

/// Response of `GET /quota/{policy}/{key}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatusResponse {
    pub policy: String,
    pub key: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: u64,
}

/// Body of `POST /tokens`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintRequest {
    pub subject: String,
    pub purpose: TokenPurpose,
    #[serde(default)]
    pub metadata: Metadata,
    /// Token lifetime; the server default when absent
    pub ttl_secs: Option<u64>,
}

/// Response of `POST /tokens`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintResponse {
    pub token: String,
    pub subject: String,
    pub purpose: TokenPurpose,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl From<MintedToken> for MintResponse {
    fn from(minted: MintedToken) -> Self {
        MintResponse {
            issued_at: to_unix_millis(minted.issued_at),
            expires_at: to_unix_millis(minted.expires_at),
            token: minted.token,
            subject: minted.subject,
            purpose: minted.purpose,
        }
    }
}

/// Body of `POST /tokens/validate`: the fields decoded from the payload
///
/// `purpose` is kept as a string so that an unknown purpose is reported
/// like any other rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
    pub subject: String,
    pub purpose: String,
    pub issued_at: u64,
}

/// Response of a successful `POST /tokens/validate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub subject: String,
    pub purpose: String,
    pub metadata: Metadata,
    pub created_at: u64,
    pub claimed_at: u64,
}

impl From<ClaimedToken> for ClaimResponse {
    fn from(claimed: ClaimedToken) -> Self {
        ClaimResponse {
            subject: claimed.subject,
            purpose: claimed.purpose,
            metadata: claimed.metadata,
            created_at: to_unix_millis(claimed.created_at),
            claimed_at: to_unix_millis(claimed.claimed_at),
        }
    }
}

/// Error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
        }
    }
}

pub fn to_unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn from_unix_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

/// Whole seconds from `now` until `at`, rounded up
pub fn seconds_between(now: SystemTime, at: SystemTime) -> u64 {
    match at.duration_since(now) {
        Ok(d) => d.as_secs() + u64::from(d.subsec_nanos() > 0),
        Err(_) => 0,
    }
}
