//! Simple metrics collection for observability
//!
//! Lightweight atomic counters exported in Prometheus text format.
//! No allocations in the hot path.

use gatecrab::TokenRejection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const REJECTION_REASONS: [TokenRejection; 7] = [
    TokenRejection::Malformed,
    TokenRejection::PayloadTooOld,
    TokenRejection::NotFound,
    TokenRejection::Expired,
    TokenRejection::AlreadyClaimed,
    TokenRejection::SubjectMismatch,
    TokenRejection::PurposeMismatch,
];

/// Core metrics collected by the server
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Quota decisions
    pub quota_allowed: AtomicU64,
    pub quota_denied: AtomicU64,

    /// Token lifecycle
    pub tokens_minted: AtomicU64,
    pub tokens_claimed: AtomicU64,
    tokens_rejected: [AtomicU64; 7],

    /// Background sweeps
    pub entries_swept: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            quota_allowed: AtomicU64::new(0),
            quota_denied: AtomicU64::new(0),
            tokens_minted: AtomicU64::new(0),
            tokens_claimed: AtomicU64::new(0),
            tokens_rejected: Default::default(),
            entries_swept: AtomicU64::new(0),
        }
    }

    pub fn record_quota(&self, allowed: bool) {
        if allowed {
            self.quota_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.quota_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_minted(&self) {
        self.tokens_minted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claimed(&self) {
        self.tokens_claimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, rejection: TokenRejection) {
        self.tokens_rejected[rejection_index(rejection)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, removed: usize) {
        self.entries_swept
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub fn rejected(&self, rejection: TokenRejection) -> u64 {
        self.tokens_rejected[rejection_index(rejection)].load(Ordering::Relaxed)
    }

    /// Replays are the `already_claimed` rejections
    pub fn replays_detected(&self) -> u64 {
        self.rejected(TokenRejection::AlreadyClaimed)
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(1500);

        output.push_str("# HELP gatecrab_uptime_seconds Time since server start in seconds\n");
        output.push_str("# TYPE gatecrab_uptime_seconds gauge\n");
        output.push_str(&format!(
            "gatecrab_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str("# HELP gatecrab_quota_allowed_total Quota checks allowed\n");
        output.push_str("# TYPE gatecrab_quota_allowed_total counter\n");
        output.push_str(&format!(
            "gatecrab_quota_allowed_total {}\n\n",
            self.quota_allowed.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatecrab_quota_denied_total Quota checks denied\n");
        output.push_str("# TYPE gatecrab_quota_denied_total counter\n");
        output.push_str(&format!(
            "gatecrab_quota_denied_total {}\n\n",
            self.quota_denied.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatecrab_tokens_minted_total Tokens minted\n");
        output.push_str("# TYPE gatecrab_tokens_minted_total counter\n");
        output.push_str(&format!(
            "gatecrab_tokens_minted_total {}\n\n",
            self.tokens_minted.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatecrab_tokens_claimed_total Tokens validated successfully\n");
        output.push_str("# TYPE gatecrab_tokens_claimed_total counter\n");
        output.push_str(&format!(
            "gatecrab_tokens_claimed_total {}\n\n",
            self.tokens_claimed.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP gatecrab_tokens_rejected_total Token validations rejected by reason\n",
        );
        output.push_str("# TYPE gatecrab_tokens_rejected_total counter\n");
        for rejection in REJECTION_REASONS {
            output.push_str(&format!(
                "gatecrab_tokens_rejected_total{{reason=\"{}\"}} {}\n",
                rejection.reason(),
                self.rejected(rejection)
            ));
        }
        output.push('\n');

        output.push_str(
            "# HELP gatecrab_replays_detected_total Tokens presented again after a claim\n",
        );
        output.push_str("# TYPE gatecrab_replays_detected_total counter\n");
        output.push_str(&format!(
            "gatecrab_replays_detected_total {}\n\n",
            self.replays_detected()
        ));

        output.push_str(
            "# HELP gatecrab_entries_swept_total Expired entries removed by the sweeper\n",
        );
        output.push_str("# TYPE gatecrab_entries_swept_total counter\n");
        output.push_str(&format!(
            "gatecrab_entries_swept_total {}\n",
            self.entries_swept.load(Ordering::Relaxed)
        ));

        output
    }
}

fn rejection_index(rejection: TokenRejection) -> usize {
    match rejection {
        TokenRejection::Malformed => 0,
        TokenRejection::PayloadTooOld => 1,
        TokenRejection::NotFound => 2,
        TokenRejection::Expired => 3,
        TokenRejection::AlreadyClaimed => 4,
        TokenRejection::SubjectMismatch => 5,
        TokenRejection::PurposeMismatch => 6,
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
