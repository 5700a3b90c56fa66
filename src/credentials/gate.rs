//! Inbound API-key gate.
//!
//! Every request either matches an exclusion rule, or must carry an `X-API-KEY` header
//! whose bcrypt hash matches the configured one. Rejections answer 401 with a JSON
//! `{"message": ..}` body and are never retried.

use super::{
    exclusion::{self, ExclusionRule},
    hasher,
};
use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinError;
use tracing::{debug, error, warn};

pub const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    Missing,
    Mismatch,
}

impl RejectReason {
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Missing => "No API key was provided.",
            Self::Mismatch => "Provided API key does not match our records.",
        }
    }
}

impl IntoResponse for RejectReason {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": self.message() })),
        )
            .into_response()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Reject(RejectReason),
}

pub struct ApiKeyGate {
    exclusions: Vec<ExclusionRule>,
    api_key_hash: SecretString,
}

impl ApiKeyGate {
    /// # Errors
    /// Returns an error if `api_key_hash` is not a bcrypt hash.
    pub fn new(api_key_hash: SecretString, exclusions: Vec<ExclusionRule>) -> Result<Self> {
        hasher::validate_hash(api_key_hash.expose_secret())?;

        Ok(Self {
            exclusions,
            api_key_hash,
        })
    }

    #[must_use]
    pub fn exclusions(&self) -> &[ExclusionRule] {
        &self.exclusions
    }

    /// Exclusion rule that lets `path` through, if any.
    #[must_use]
    pub fn exclusion_for(&self, path: &str) -> Option<&ExclusionRule> {
        exclusion::first_match(&self.exclusions, path)
    }

    /// Decide whether a request for `path` carrying `provided` as its API key may pass.
    ///
    /// A blank header counts as missing. Any other value is verified exactly as sent,
    /// surrounding whitespace included. Deterministic for the same inputs. Runs a bcrypt verification for
    /// non-excluded paths, so call it off the async executor.
    #[must_use]
    pub fn authorize(&self, path: &str, provided: Option<&str>) -> GateDecision {
        if let Some(rule) = self.exclusion_for(path) {
            debug!("Path {} excluded from API key check by {}", path, rule.pattern());
            return GateDecision::Allow;
        }

        let Some(candidate) = provided.filter(|key| !key.trim().is_empty()) else {
            return GateDecision::Reject(RejectReason::Missing);
        };

        if hasher::verify(candidate, self.api_key_hash.expose_secret()) {
            GateDecision::Allow
        } else {
            GateDecision::Reject(RejectReason::Mismatch)
        }
    }
}

impl std::fmt::Debug for ApiKeyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyGate")
            .field("exclusions", &self.exclusions)
            .field("api_key_hash", &"***")
            .finish()
    }
}

/// axum middleware running [`ApiKeyGate::authorize`] on every request.
pub async fn require_api_key(
    State(gate): State<Arc<ApiKeyGate>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if gate.exclusion_for(&path).is_some() {
        return next.run(request).await;
    }

    let provided = match request
        .headers()
        .get(API_KEY_HEADER)
        .map(HeaderValue::to_str)
    {
        None => None,
        Some(Ok(value)) => Some(value.to_string()),
        // Non-visible ASCII can never match a key that was hashed from a header value
        Some(Err(_)) => {
            reject_log(&request, &path, RejectReason::Mismatch);
            return RejectReason::Mismatch.into_response();
        }
    };

    let decision = {
        let gate = Arc::clone(&gate);
        let path = path.clone();
        tokio::task::spawn_blocking(move || gate.authorize(&path, provided.as_deref())).await
    };

    match decision {
        Ok(GateDecision::Allow) => next.run(request).await,
        Ok(GateDecision::Reject(reason)) => {
            reject_log(&request, &path, reason);
            reason.into_response()
        }
        Err(e) => verification_failed(&e),
    }
}

fn verification_failed(e: &JoinError) -> Response {
    error!("API key verification task failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error" })),
    )
        .into_response()
}

fn reject_log(request: &Request, path: &str, reason: RejectReason) {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.to_string());

    warn!(
        remote_addr = %remote,
        "Unauthorized request to {}: {}",
        path,
        reason.message()
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    const TEST_COST: u32 = 4;

    fn gate(key: &str, patterns: &[&str]) -> ApiKeyGate {
        let hash = hasher::hash(key, TEST_COST).unwrap();
        ApiKeyGate::new(
            SecretString::from(hash),
            exclusion::compile(patterns).unwrap(),
        )
        .unwrap()
    }

    fn router(gate: ApiKeyGate) -> Router {
        Router::new()
            .route("/accounts/:id", get(|| async { "account" }))
            .route("/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                Arc::new(gate),
                require_api_key,
            ))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn new_rejects_invalid_hash() {
        let result = ApiKeyGate::new(SecretString::from("plain".to_string()), Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn excluded_path_is_allowed_without_header() {
        let gate = gate("abc123", &["/health", "/swagger-ui/**"]);
        assert_eq!(gate.authorize("/health", None), GateDecision::Allow);
        assert_eq!(
            gate.authorize("/swagger-ui/index.html", Some("wrong")),
            GateDecision::Allow
        );
    }

    #[test]
    fn exclusion_is_case_sensitive() {
        let gate = gate("abc123", &["/health"]);
        assert_eq!(
            gate.authorize("/HEALTH", None),
            GateDecision::Reject(RejectReason::Missing)
        );
    }

    #[test]
    fn missing_and_blank_headers_are_rejected_as_missing() {
        let gate = gate("abc123", &[]);
        assert_eq!(
            gate.authorize("/accounts/1", None),
            GateDecision::Reject(RejectReason::Missing)
        );
        assert_eq!(
            gate.authorize("/accounts/1", Some("   ")),
            GateDecision::Reject(RejectReason::Missing)
        );
    }

    #[test]
    fn matching_key_is_allowed_deterministically() {
        let gate = gate("abc123", &[]);
        for _ in 0..3 {
            assert_eq!(
                gate.authorize("/accounts/1", Some("abc123")),
                GateDecision::Allow
            );
            assert_eq!(
                gate.authorize("/accounts/1", Some("wrong")),
                GateDecision::Reject(RejectReason::Mismatch)
            );
        }
    }

    #[test]
    fn padded_key_is_a_mismatch() {
        let gate = gate("abc123", &[]);
        assert_eq!(
            gate.authorize("/accounts/1", Some(" abc123 ")),
            GateDecision::Reject(RejectReason::Mismatch)
        );
        assert_eq!(
            gate.authorize("/accounts/1", Some("abc123\t")),
            GateDecision::Reject(RejectReason::Mismatch)
        );
    }

    #[tokio::test]
    async fn crashed_verification_is_a_500() {
        let err = tokio::task::spawn_blocking(|| -> GateDecision { panic!("bcrypt crashed") })
            .await
            .unwrap_err();
        assert!(err.is_panic());

        let response = verification_failed(&err);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "Internal Server Error");
    }

    #[test]
    fn debug_hides_hash() {
        let gate = gate("abc123", &["/health"]);
        let rendered = format!("{gate:?}");
        assert!(!rendered.contains("$2"));
        assert!(rendered.contains("/health"));
    }

    #[tokio::test]
    async fn middleware_passes_valid_key() {
        let app = router(gate("abc123", &["/health"]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/accounts/1")
                    .header(API_KEY_HEADER, "abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn middleware_rejects_missing_key() {
        let app = router(gate("abc123", &["/health"]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/accounts/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["message"], "No API key was provided.");
    }

    #[tokio::test]
    async fn middleware_rejects_wrong_key() {
        let app = router(gate("abc123", &["/health"]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/accounts/1")
                    .header(API_KEY_HEADER, "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Provided API key does not match our records.");
    }

    #[tokio::test]
    async fn middleware_rejects_non_ascii_key_as_mismatch() {
        let app = router(gate("abc123", &[]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/accounts/1")
                    .header(API_KEY_HEADER, HeaderValue::from_bytes(b"\xffabc").unwrap())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Provided API key does not match our records.");
    }

    #[tokio::test]
    async fn middleware_skips_excluded_path() {
        let app = router(gate("abc123", &["/health"]));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
