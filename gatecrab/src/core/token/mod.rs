//! Single-use anti-replay tokens
//!
//! A [`TokenPolicy`] mints random tokens bound to a subject and a
//! [`TokenPurpose`], and later accepts each token exactly once. The token
//! travels inside an external payload (for example a scannable badge) that
//! also carries the subject, purpose and the time the payload was issued.
//!
//! Validation order:
//!
//! 1. Reject malformed presentations.
//! 2. Reject payloads older than the policy's maximum age, without touching
//!    the store. This bounds payloads whose embedded timestamp was forged.
//! 3. Claim the token in the store (expired, replayed, unknown and
//!    wrong-subject tokens are rejected here).
//! 4. Check the stored purpose against the presented one.
//!
//! Every rejection shares one user-facing message; the precise reason is for
//! logs only.


use super::store::{ClaimOutcome, ClaimedToken, EntryStore, Metadata};
use super::{GateError, fingerprint};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_PAYLOAD_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// What a token grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum TokenPurpose {
    Badge,
    CheckIn,
    Appointment,
    Access,
}

impl TokenPurpose {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Badge => "badge",
            TokenPurpose::CheckIn => "check-in",
            TokenPurpose::Appointment => "appointment",
            TokenPurpose::Access => "access",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenPurpose {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "badge" => Ok(TokenPurpose::Badge),
            "check-in" | "checkin" => Ok(TokenPurpose::CheckIn),
            "appointment" => Ok(TokenPurpose::Appointment),
            "access" => Ok(TokenPurpose::Access),
            _ => Err(GateError::InvalidConfig(format!(
                "unknown token purpose: {s}. Valid options are: badge, check-in, appointment, access"
            ))),
        }
    }
}

/// A freshly minted token and the fields to embed next to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub token: String,
    pub subject: String,
    pub purpose: TokenPurpose,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
}

impl MintedToken {
    /// The presentation a legitimate holder would make for this token
    pub fn presentation(&self) -> PresentedToken {
        PresentedToken {
            token: self.token.clone(),
            subject: self.subject.clone(),
            purpose: self.purpose,
            issued_at: self.issued_at,
        }
    }
}

/// Fields decoded from a presented payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedToken {
    pub token: String,
    pub subject: String,
    pub purpose: TokenPurpose,
    /// Client-supplied creation time embedded in the payload
    pub issued_at: SystemTime,
}

/// Why a presented token was refused
///
/// All variants are terminal for the token; the holder needs a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("token payload is malformed")]
    Malformed,
    #[error("token payload is older than the maximum allowed age")]
    PayloadTooOld,
    #[error("token not found")]
    NotFound,
    #[error("token expired")]
    Expired,
    #[error("token already used (possible replay)")]
    AlreadyClaimed,
    #[error("token was issued to a different subject")]
    SubjectMismatch,
    #[error("token was issued for a different purpose")]
    PurposeMismatch,
}

impl TokenRejection {
    /// Message safe to show the presenter, identical for every variant
    pub const fn public_message(&self) -> &'static str {
        "invalid or already-used code"
    }

    /// Stable identifier for logs and metrics labels
    pub const fn reason(&self) -> &'static str {
        match self {
            TokenRejection::Malformed => "malformed",
            TokenRejection::PayloadTooOld => "payload_too_old",
            TokenRejection::NotFound => "not_found",
            TokenRejection::Expired => "expired",
            TokenRejection::AlreadyClaimed => "already_claimed",
            TokenRejection::SubjectMismatch => "subject_mismatch",
            TokenRejection::PurposeMismatch => "purpose_mismatch",
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, TokenRejection::AlreadyClaimed)
    }
}

/// Mints and validates single-use tokens over a shared entry store
///
/// # Example
///
/// ```
/// use gatecrab::{EntryStore, Metadata, TokenPolicy, TokenPurpose, TokenRejection};
/// use std::sync::Arc;
///
/// let policy = TokenPolicy::new(Arc::new(EntryStore::new()));
///
/// let minted = policy.mint("user-42", TokenPurpose::Badge, Metadata::new()).unwrap();
/// let presented = minted.presentation();
///
/// let claimed = policy.validate(&presented).unwrap();
/// assert_eq!(claimed.subject, "user-42");
/// assert_eq!(policy.validate(&presented), Err(TokenRejection::AlreadyClaimed));
/// ```
#[derive(Clone)]
pub struct TokenPolicy {
    store: Arc<EntryStore>,
    default_ttl: Duration,
    max_payload_age: Duration,
}

impl TokenPolicy {
    /// Policy with a 5 minute token lifetime and a 24 hour maximum payload age
    pub fn new(store: Arc<EntryStore>) -> Self {
        TokenPolicy {
            store,
            default_ttl: DEFAULT_TOKEN_TTL,
            max_payload_age: DEFAULT_MAX_PAYLOAD_AGE,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_payload_age(mut self, age: Duration) -> Self {
        self.max_payload_age = age;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn max_payload_age(&self) -> Duration {
        self.max_payload_age
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    /// Mint a token with the policy's default lifetime
    pub fn mint(
        &self,
        subject: impl Into<String>,
        purpose: TokenPurpose,
        metadata: Metadata,
    ) -> Result<MintedToken, GateError> {
        self.mint_with_ttl(subject, purpose, metadata, self.default_ttl)
    }

    /// Mint a token that expires `ttl` from now
    ///
    /// # Errors
    ///
    /// [`GateError::InvalidConfig`] when `ttl` reaches past the representable
    /// time range, and [`GateError::TokenCollision`] from the store.
    pub fn mint_with_ttl(
        &self,
        subject: impl Into<String>,
        purpose: TokenPurpose,
        metadata: Metadata,
        ttl: Duration,
    ) -> Result<MintedToken, GateError> {
        let subject = subject.into();
        let issued = self
            .store
            .issue_token(subject.clone(), purpose.as_str(), ttl, metadata)?;

        Ok(MintedToken {
            token: issued.token,
            subject,
            purpose,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
        })
    }

    /// Accept a presented token exactly once
    pub fn validate(&self, presented: &PresentedToken) -> Result<ClaimedToken, TokenRejection> {
        self.check_presentation(presented)?;

        let outcome = self
            .store
            .claim(&presented.token, Some(presented.subject.as_str()));
        let claimed = match outcome {
            ClaimOutcome::Claimed(claimed) => claimed,
            ClaimOutcome::NotFound => return Err(TokenRejection::NotFound),
            ClaimOutcome::Expired => return Err(TokenRejection::Expired),
            ClaimOutcome::AlreadyClaimed => return Err(TokenRejection::AlreadyClaimed),
            ClaimOutcome::SubjectMismatch => return Err(TokenRejection::SubjectMismatch),
        };

        if claimed.purpose != presented.purpose.as_str() {
            tracing::warn!(
                token = fingerprint(&presented.token),
                stored = %claimed.purpose,
                presented = %presented.purpose,
                "token presented for a different purpose"
            );
            return Err(TokenRejection::PurposeMismatch);
        }

        tracing::info!(
            token = fingerprint(&presented.token),
            subject = %claimed.subject,
            purpose = %claimed.purpose,
            "token validated"
        );
        Ok(claimed)
    }

    /// Structural and age checks that never consult the store
    pub(crate) fn check_presentation(
        &self,
        presented: &PresentedToken,
    ) -> Result<(), TokenRejection> {
        if presented.token.is_empty() || presented.subject.is_empty() {
            return Err(TokenRejection::Malformed);
        }

        // A payload stamped in the future counts as brand new
        let age = self
            .store
            .now()
            .duration_since(presented.issued_at)
            .unwrap_or(Duration::ZERO);
        if age > self.max_payload_age {
            tracing::debug!(
                token = fingerprint(&presented.token),
                age_secs = age.as_secs(),
                "token payload too old"
            );
            return Err(TokenRejection::PayloadTooOld);
        }

        Ok(())
    }
}
