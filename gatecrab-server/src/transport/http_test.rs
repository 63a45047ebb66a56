#[cfg(test)]
mod tests {
    use super::super::http::router;
    use crate::state::AppState;
    use crate::types::{
        ClaimResponse, ErrorResponse, MintResponse, QuotaResponse, QuotaStatusResponse,
    };
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use gatecrab::{EntryStore, QuotaConfig, QuotaPolicy, TokenPolicy, TokenService};
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Arc<AppState>, Router) {
        let quota_store = Arc::new(EntryStore::new());
        let state = Arc::new(AppState::new(
            vec![QuotaPolicy::new(
                quota_store,
                "export",
                QuotaConfig::per_hour(2),
            )],
            TokenService::new(TokenPolicy::new(Arc::new(EntryStore::new()))),
            Duration::from_secs(60),
        ));
        (state.clone(), router(state))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_state, app) = app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn test_quota_check_allows_then_denies() {
        let (state, app) = app();
        let body = r#"{"policy": "export", "key": "user:123"}"#;

        for expected_remaining in [1, 0] {
            let (status, bytes) = send(&app, Method::POST, "/quota/check", Some(body)).await;
            assert_eq!(status, StatusCode::OK);
            let response: QuotaResponse = json(&bytes);
            assert!(response.allowed);
            assert_eq!(response.limit, 2);
            assert_eq!(response.remaining, expected_remaining);
            assert_eq!(response.retry_after, 0);
        }

        let (status, bytes) = send(&app, Method::POST, "/quota/check", Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let response: QuotaResponse = json(&bytes);
        assert!(!response.allowed);
        assert_eq!(response.remaining, 0);
        assert!(response.retry_after > 3500 && response.retry_after <= 3600);

        let metrics = state.metrics().export_prometheus();
        assert!(metrics.contains("gatecrab_quota_allowed_total 2"));
        assert!(metrics.contains("gatecrab_quota_denied_total 1"));
    }

    #[tokio::test]
    async fn test_unknown_policy() {
        let (_state, app) = app();

        let (status, bytes) = send(
            &app,
            Method::POST,
            "/quota/check",
            Some(r#"{"policy": "nope", "key": "k"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorResponse = json(&bytes);
        assert!(error.error.contains("nope"));

        let (status, _) = send(&app, Method::GET, "/quota/nope/k", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_quota_status_and_reset() {
        let (_state, app) = app();
        let check = r#"{"policy": "export", "key": "alice"}"#;

        let (_, bytes) = send(&app, Method::GET, "/quota/export/alice", None).await;
        let status: QuotaStatusResponse = json(&bytes);
        assert_eq!(status.remaining, 2);
        assert_eq!(status.reset_after, 0);

        send(&app, Method::POST, "/quota/check", Some(check)).await;
        send(&app, Method::POST, "/quota/check", Some(check)).await;

        let (_, bytes) = send(&app, Method::GET, "/quota/export/alice", None).await;
        let status: QuotaStatusResponse = json(&bytes);
        assert_eq!(status.policy, "export");
        assert_eq!(status.key, "alice");
        assert_eq!(status.remaining, 0);
        assert!(status.reset_after > 0);

        let (code, _) = send(&app, Method::DELETE, "/quota/export/alice", None).await;
        assert_eq!(code, StatusCode::NO_CONTENT);

        let (code, _) = send(&app, Method::POST, "/quota/check", Some(check)).await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mint_and_validate_once() {
        let (state, app) = app();

        let (status, bytes) = send(
            &app,
            Method::POST,
            "/tokens",
            Some(r#"{"subject": "user-42", "purpose": "badge", "metadata": {"event": "rustconf"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let minted: MintResponse = json(&bytes);
        assert_eq!(minted.token.len(), 64);
        assert_eq!(minted.expires_at - minted.issued_at, 300_000);

        let validate = format!(
            r#"{{"token": "{}", "subject": "user-42", "purpose": "badge", "issued_at": {}}}"#,
            minted.token, minted.issued_at
        );

        let (status, bytes) =
            send(&app, Method::POST, "/tokens/validate", Some(validate.as_str())).await;
        assert_eq!(status, StatusCode::OK);
        let claimed: ClaimResponse = json(&bytes);
        assert_eq!(claimed.subject, "user-42");
        assert_eq!(claimed.purpose, "badge");
        assert_eq!(claimed.metadata.len(), 1);

        let (status, bytes) =
            send(&app, Method::POST, "/tokens/validate", Some(validate.as_str())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let error: ErrorResponse = json(&bytes);
        assert_eq!(error.error, "invalid or already-used code");

        assert_eq!(state.metrics().replays_detected(), 1);
    }

    #[tokio::test]
    async fn test_every_rejection_looks_the_same() {
        let (_state, app) = app();

        let (_, bytes) = send(
            &app,
            Method::POST,
            "/tokens",
            Some(r#"{"subject": "user-42", "purpose": "access"}"#),
        )
        .await;
        let minted: MintResponse = json(&bytes);

        let cases = [
            // unknown token
            format!(
                r#"{{"token": "{}", "subject": "user-42", "purpose": "access", "issued_at": {}}}"#,
                "0".repeat(64),
                minted.issued_at
            ),
            // wrong subject
            format!(
                r#"{{"token": "{}", "subject": "user-7", "purpose": "access", "issued_at": {}}}"#,
                minted.token, minted.issued_at
            ),
            // unknown purpose
            format!(
                r#"{{"token": "{}", "subject": "user-42", "purpose": "coupon", "issued_at": {}}}"#,
                minted.token, minted.issued_at
            ),
            // payload older than a day
            format!(
                r#"{{"token": "{}", "subject": "user-42", "purpose": "access", "issued_at": {}}}"#,
                minted.token,
                minted.issued_at - 25 * 3600 * 1000
            ),
        ];

        let mut bodies = Vec::new();
        for case in &cases {
            let (status, bytes) =
                send(&app, Method::POST, "/tokens/validate", Some(case.as_str())).await;
            assert_eq!(status, StatusCode::CONFLICT);
            bodies.push(bytes);
        }
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_mint_rejects_bad_input() {
        let (_state, app) = app();

        let (status, _) = send(
            &app,
            Method::POST,
            "/tokens",
            Some(r#"{"subject": "", "purpose": "badge"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/tokens",
            Some(r#"{"subject": "user-42", "purpose": "badge", "ttl_secs": 0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mint_ttl_is_bounded_by_payload_age() {
        let (state, app) = app();
        let mint = |ttl: u64| {
            format!(r#"{{"subject": "user-42", "purpose": "badge", "ttl_secs": {ttl}}}"#)
        };

        for ttl in [86_401, u64::MAX] {
            let body = mint(ttl);
            let (status, bytes) = send(&app, Method::POST, "/tokens", Some(body.as_str())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let error: ErrorResponse = json(&bytes);
            assert_eq!(error.error, "ttl_secs must not exceed 86400");
        }
        assert!(state.tokens().policy().store().is_empty());

        let body = mint(86_400);
        let (status, bytes) = send(&app, Method::POST, "/tokens", Some(body.as_str())).await;
        assert_eq!(status, StatusCode::CREATED);
        let minted: MintResponse = json(&bytes);
        assert_eq!(minted.expires_at - minted.issued_at, 86_400_000);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (_state, app) = app();
        let (status, body) = send(&app, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("gatecrab_tokens_minted_total 0"));
    }
}
