//! HTTP/JSON transport
//!
//! # API Endpoints
//!
//! ## POST /quota/check
//!
//! Consume one operation from a quota.
//!
//! ```json
//! { "policy": "export", "key": "user:123" }
//! ```
//!
//! Responds 200 with a [`QuotaResponse`] when allowed and 429 with the same
//! body when denied. Unknown policies get 404.
//!
//! ## GET /quota/{policy}/{key}
//!
//! Remaining budget and seconds until reset, without consuming.
//!
//! ## DELETE /quota/{policy}/{key}
//!
//! Administrative reset of one key. Responds 204.
//!
//! ## POST /tokens
//!
//! Mint a single-use token. Responds 201 with a [`MintResponse`], or 400 when
//! `ttl_secs` is zero or longer than the maximum payload age.
//!
//! ```json
//! { "subject": "user-42", "purpose": "badge", "metadata": {"event": "rustconf"} }
//! ```
//!
//! ## POST /tokens/validate
//!
//! Claim a presented token. Responds 200 with the claimed token, or 409 with
//! `{"error": "invalid or already-used code"}` for every kind of rejection.
//!
//! ## GET /health
//!
//! Returns "OK" with 200 status.
//!
//! ## GET /metrics
//!
//! Prometheus text format.

use super::{Shutdown, Transport};
use crate::state::AppState;
use crate::types::{
    ClaimResponse, ErrorResponse, MintRequest, MintResponse, QuotaCheckRequest, QuotaResponse,
    QuotaStatusResponse, ValidateRequest, from_unix_millis, seconds_between,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use gatecrab::{PresentedToken, TokenPurpose, TokenRejection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// HTTP transport implementation
pub struct HttpTransport {
    addr: SocketAddr,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid HTTP address {host}:{port}"))?;
        Ok(Self { addr })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, state: Arc<AppState>, shutdown: Shutdown) -> Result<()> {
        let app = router(state);

        tracing::info!("HTTP server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the API router over `state`
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/quota/check", post(handle_quota_check))
        .route(
            "/quota/{policy}/{key}",
            get(handle_quota_status).delete(handle_quota_reset),
        )
        .route("/tokens", post(handle_mint))
        .route("/tokens/validate", post(handle_validate))
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

fn unknown_policy(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(format!("unknown quota policy: {name}"))),
    )
        .into_response()
}

async fn handle_quota_check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuotaCheckRequest>,
) -> Response {
    let Some(policy) = state.quota(&req.policy) else {
        return unknown_policy(&req.policy);
    };

    let decision = policy.try_acquire(&req.key);
    state.metrics().record_quota(decision.is_allowed());

    let body = QuotaResponse::from_consume(&decision, policy.store().now());
    let status = if body.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    (status, Json(body)).into_response()
}

async fn handle_quota_status(
    State(state): State<Arc<AppState>>,
    Path((name, key)): Path<(String, String)>,
) -> Response {
    let Some(policy) = state.quota(&name) else {
        return unknown_policy(&name);
    };

    let reset_after = policy
        .reset_at(&key)
        .map(|at| seconds_between(policy.store().now(), at))
        .unwrap_or(0);
    Json(QuotaStatusResponse {
        limit: policy.config().max_requests(),
        remaining: policy.remaining(&key),
        reset_after,
        policy: name,
        key,
    })
    .into_response()
}

async fn handle_quota_reset(
    State(state): State<Arc<AppState>>,
    Path((name, key)): Path<(String, String)>,
) -> Response {
    let Some(policy) = state.quota(&name) else {
        return unknown_policy(&name);
    };

    policy.reset(&key);
    tracing::info!(policy = %name, key = %key, "quota reset");
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_mint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MintRequest>,
) -> Result<(StatusCode, Json<MintResponse>), (StatusCode, Json<ErrorResponse>)> {
    if req.subject.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("subject must not be empty")),
        ));
    }

    let tokens = state.tokens();
    let max_ttl = tokens.policy().max_payload_age();
    let minted = match req.ttl_secs.map(Duration::from_secs) {
        Some(ttl) if ttl.is_zero() => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("ttl_secs must be greater than 0")),
            ));
        }
        Some(ttl) if ttl > max_ttl => {
            let message = format!("ttl_secs must not exceed {}", max_ttl.as_secs());
            return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))));
        }
        Some(ttl) => {
            tokens
                .mint_with_ttl(req.subject, req.purpose, req.metadata, ttl)
                .await
        }
        None => tokens.mint(req.subject, req.purpose, req.metadata).await,
    };

    match minted {
        Ok(minted) => {
            state.metrics().record_minted();
            Ok((StatusCode::CREATED, Json(MintResponse::from(minted))))
        }
        Err(e) => {
            tracing::error!("Token mint failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal server error")),
            ))
        }
    }
}

async fn handle_validate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ClaimResponse>, (StatusCode, Json<ErrorResponse>)> {
    let result = match req.purpose.parse::<TokenPurpose>() {
        Ok(purpose) => {
            let presented = PresentedToken {
                token: req.token,
                subject: req.subject,
                purpose,
                issued_at: from_unix_millis(req.issued_at),
            };
            state.tokens().validate(&presented).await
        }
        Err(_) => Err(TokenRejection::Malformed),
    };

    match result {
        Ok(claimed) => {
            state.metrics().record_claimed();
            Ok(Json(ClaimResponse::from(claimed)))
        }
        Err(rejection) => {
            state.metrics().record_rejected(rejection);
            tracing::debug!(reason = rejection.reason(), "token rejected");
            Err((
                StatusCode::CONFLICT,
                Json(ErrorResponse::new(rejection.public_message())),
            ))
        }
    }
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics().export_prometheus()
}
