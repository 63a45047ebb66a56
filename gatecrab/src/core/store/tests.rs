use super::*;
use crate::core::clock::ManualClock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::UNIX_EPOCH;

const MINUTE: Duration = Duration::from_secs(60);

fn store_at(start: SystemTime) -> (Arc<ManualClock>, EntryStore) {
    let clock = Arc::new(ManualClock::new(start));
    let store = EntryStore::builder()
        .shards(8)
        .clock(clock.clone())
        .build()
        .unwrap();
    (clock, store)
}

fn start() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

/// Always yields the same bytes, so every mint collides after the first
struct FixedRandom;

impl RandomSource for FixedRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        dest.fill(0xab);
    }
}

#[test]
fn test_consume_allows_up_to_limit() {
    let (_clock, store) = store_at(start());

    for i in 1..=3u64 {
        match store.try_consume("k", MINUTE, 3) {
            Consume::Allowed(state) => {
                assert_eq!(state.limit, 3);
                assert_eq!(state.remaining, 3 - i);
                assert_eq!(state.reset_at, start() + MINUTE);
            }
            other => panic!("request {i} should be allowed, got {other:?}"),
        }
    }

    let denied = store.try_consume("k", MINUTE, 3);
    assert!(!denied.is_allowed());
    assert_eq!(denied.state().remaining, 0);
    assert_eq!(store.remaining("k", 3), 0);
}

#[test]
fn test_denied_consume_does_not_mutate() {
    let (_clock, store) = store_at(start());

    store.try_consume("k", MINUTE, 1);
    for _ in 0..10 {
        assert!(!store.try_consume("k", MINUTE, 1).is_allowed());
    }

    // Raising the limit shows the stored count stayed at 1
    assert_eq!(store.remaining("k", 5), 4);
}

#[test]
fn test_window_resets_after_expiry() {
    let (clock, store) = store_at(start());

    assert!(store.try_consume("k", MINUTE, 2).is_allowed());
    assert!(store.try_consume("k", MINUTE, 2).is_allowed());
    assert!(!store.try_consume("k", MINUTE, 2).is_allowed());

    clock.advance(Duration::from_secs(61));

    match store.try_consume("k", MINUTE, 2) {
        Consume::Allowed(state) => {
            assert_eq!(state.remaining, 1, "counter restarts at 1");
            assert_eq!(state.reset_at, start() + Duration::from_secs(61) + MINUTE);
        }
        other => panic!("expected fresh window, got {other:?}"),
    }
}

#[test]
fn test_expiry_boundary_is_exclusive() {
    let (clock, store) = store_at(start());

    store.try_consume("k", MINUTE, 1);
    clock.advance(MINUTE);

    // expires_at <= now means absent
    assert_eq!(store.reset_at("k"), None);
    assert_eq!(store.remaining("k", 1), 1);
    assert!(store.try_consume("k", MINUTE, 1).is_allowed());
}

#[test]
fn test_window_is_not_extended_by_activity() {
    let (clock, store) = store_at(start());

    store.try_consume("k", MINUTE, 100);
    for _ in 0..5 {
        clock.advance(Duration::from_secs(10));
        store.try_consume("k", MINUTE, 100);
        store.remaining("k", 100);
    }

    assert_eq!(store.reset_at("k"), Some(start() + MINUTE));
}

#[test]
fn test_remaining_is_read_only() {
    let (_clock, store) = store_at(start());

    assert_eq!(store.remaining("fresh", 5), 5);
    assert_eq!(store.reset_at("fresh"), None);
    assert!(store.is_empty());

    store.try_consume("k", MINUTE, 5);
    for _ in 0..10 {
        assert_eq!(store.remaining("k", 5), 4);
    }
}

#[test]
fn test_keys_are_isolated() {
    let (_clock, store) = store_at(start());

    for _ in 0..3 {
        store.try_consume("a", MINUTE, 3);
    }
    assert!(!store.try_consume("a", MINUTE, 3).is_allowed());
    assert!(store.try_consume("b", MINUTE, 3).is_allowed());
    assert_eq!(store.remaining("b", 3), 2);
}

#[test]
fn test_zero_limit_always_denies() {
    let (_clock, store) = store_at(start());

    assert!(!store.try_consume("k", MINUTE, 0).is_allowed());
    assert!(store.is_empty());
}

#[test]
fn test_reset_is_idempotent() {
    let (_clock, store) = store_at(start());

    store.reset("missing");
    store.reset("missing");

    store.try_consume("k", MINUTE, 1);
    assert!(!store.try_consume("k", MINUTE, 1).is_allowed());

    store.reset("k");
    store.reset("k");
    assert_eq!(store.reset_at("k"), None);
    assert!(store.try_consume("k", MINUTE, 1).is_allowed());
}

#[test]
fn test_token_format() {
    let (_clock, store) = store_at(start());

    let token = store
        .create_token("user-1", "badge", MINUTE, Metadata::new())
        .unwrap();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let other = store
        .create_token("user-1", "badge", MINUTE, Metadata::new())
        .unwrap();
    assert_ne!(token, other);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_claim_returns_stored_data_once() {
    let (clock, store) = store_at(start());

    let mut metadata = Metadata::new();
    metadata.insert("event".into(), "gala".into());
    metadata.insert("seats".into(), MetaValue::Int(2));

    let token = store
        .create_token("user-42", "badge", Duration::from_secs(300), metadata.clone())
        .unwrap();

    clock.advance(Duration::from_secs(5));
    match store.claim(&token, None) {
        ClaimOutcome::Claimed(claimed) => {
            assert_eq!(claimed.subject, "user-42");
            assert_eq!(claimed.purpose, "badge");
            assert_eq!(claimed.metadata, metadata);
            assert_eq!(claimed.created_at, start());
            assert_eq!(claimed.expires_at, start() + Duration::from_secs(300));
            assert_eq!(claimed.claimed_at, start() + Duration::from_secs(5));
        }
        other => panic!("expected claim, got {other:?}"),
    }

    for _ in 0..5 {
        assert_eq!(store.claim(&token, None), ClaimOutcome::AlreadyClaimed);
    }
}

#[test]
fn test_unknown_token_is_not_found() {
    let (_clock, store) = store_at(start());
    assert_eq!(store.claim("deadbeef", None), ClaimOutcome::NotFound);
}

#[test]
fn test_expired_takes_precedence() {
    let (clock, store) = store_at(start());

    let unused = store
        .create_token("u", "access", MINUTE, Metadata::new())
        .unwrap();
    let used = store
        .create_token("u", "access", MINUTE, Metadata::new())
        .unwrap();
    assert!(matches!(store.claim(&used, None), ClaimOutcome::Claimed(_)));

    clock.advance(MINUTE);

    assert_eq!(store.claim(&unused, None), ClaimOutcome::Expired);
    assert_eq!(store.claim(&used, None), ClaimOutcome::Expired);

    store.sweep();
    assert_eq!(store.claim(&unused, None), ClaimOutcome::NotFound);
}

#[test]
fn test_subject_mismatch_leaves_token_unclaimed() {
    let (_clock, store) = store_at(start());

    let token = store
        .create_token("alice", "check-in", MINUTE, Metadata::new())
        .unwrap();

    assert_eq!(
        store.claim(&token, Some("mallory")),
        ClaimOutcome::SubjectMismatch
    );
    assert!(matches!(
        store.claim(&token, Some("alice")),
        ClaimOutcome::Claimed(_)
    ));
    // A replay is reported as such regardless of the presented subject
    assert_eq!(
        store.claim(&token, Some("mallory")),
        ClaimOutcome::AlreadyClaimed
    );
}

#[test]
fn test_entry_kinds_do_not_cross() {
    let (_clock, store) = store_at(start());

    let token = store
        .create_token("u", "badge", MINUTE, Metadata::new())
        .unwrap();
    assert!(!store.try_consume(&token, MINUTE, 10).is_allowed());
    assert_eq!(store.remaining(&token, 10), 0);

    store.try_consume("counter", MINUTE, 10);
    assert_eq!(store.claim("counter", None), ClaimOutcome::NotFound);

    // The claimable entry is untouched by the consume attempt
    assert!(matches!(store.claim(&token, None), ClaimOutcome::Claimed(_)));
}

#[test]
fn test_mint_gives_up_after_repeated_collisions() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = EntryStore::builder()
        .clock(clock.clone())
        .random(Arc::new(FixedRandom))
        .build()
        .unwrap();

    let first = store
        .create_token("u", "badge", MINUTE, Metadata::new())
        .unwrap();
    assert_eq!(first, "ab".repeat(32));

    let err = store
        .create_token("u", "badge", MINUTE, Metadata::new())
        .unwrap_err();
    assert!(matches!(err, GateError::TokenCollision(MAX_MINT_ATTEMPTS)));

    // Once the colliding entry has expired its key can be reused
    clock.advance(MINUTE);
    assert_eq!(
        store
            .create_token("u", "badge", MINUTE, Metadata::new())
            .unwrap(),
        first
    );
}

#[test]
fn test_builder_rejects_zero_shards() {
    assert!(matches!(
        EntryStore::builder().shards(0).build(),
        Err(GateError::InvalidConfig(_))
    ));
    assert_eq!(
        EntryStore::builder().shards(3).build().unwrap().shard_count(),
        3
    );
    assert!(EntryStore::new().shard_count() > 0);
}

#[test]
fn test_concurrent_claims_have_single_winner() {
    let (_clock, store) = store_at(start());
    let token = store
        .create_token("user-42", "badge", MINUTE, Metadata::new())
        .unwrap();

    let claimed = AtomicUsize::new(0);
    let replayed = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..32 {
            s.spawn(|| match store.claim(&token, None) {
                ClaimOutcome::Claimed(_) => {
                    claimed.fetch_add(1, Ordering::SeqCst);
                }
                ClaimOutcome::AlreadyClaimed => {
                    replayed.fetch_add(1, Ordering::SeqCst);
                }
                other => panic!("unexpected outcome {other:?}"),
            });
        }
    });

    assert_eq!(claimed.load(Ordering::SeqCst), 1);
    assert_eq!(replayed.load(Ordering::SeqCst), 31);
}

#[test]
fn test_concurrent_consumes_never_exceed_limit() {
    let (_clock, store) = store_at(start());
    let allowed = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                for _ in 0..10 {
                    if store.try_consume("shared", MINUTE, 25).is_allowed() {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(allowed.load(Ordering::SeqCst), 25);
    assert_eq!(store.remaining("shared", 25), 0);
}

#[test]
fn test_issue_token_reports_stored_times() {
    let (clock, store) = store_at(start());

    let issued = store
        .issue_token("user-42", "badge", MINUTE, Metadata::new())
        .unwrap();
    assert_eq!(issued.issued_at, start());
    assert_eq!(issued.expires_at, start() + MINUTE);
    assert_eq!(store.reset_at(&issued.token), Some(issued.expires_at));

    clock.advance(MINUTE);
    assert_eq!(store.claim(&issued.token, None), ClaimOutcome::Expired);
}

#[test]
fn test_token_ttl_past_time_range_is_rejected() {
    let (_clock, store) = store_at(start());

    let result = store.create_token("u", "badge", Duration::MAX, Metadata::new());

    assert!(matches!(result, Err(GateError::InvalidConfig(_))));
    assert!(store.is_empty());
}

#[test]
fn test_quota_window_past_time_range_denies() {
    let (_clock, store) = store_at(start());

    let decision = store.try_consume("k", Duration::MAX, 5);

    assert!(!decision.is_allowed());
    assert_eq!(decision.state().remaining, 0);
    assert!(store.is_empty());
}
