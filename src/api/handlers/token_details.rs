use super::internal_error;
use crate::credentials::{TokenStore, UpstreamClient};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reqwest::Method;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::debug;

pub const TOKEN_DETAILS_PATH: &str = "/v1/sessions/details";

/// Details of the token the gateway currently holds, as reported by the upstream.
#[utoipa::path(
    post,
    path = "/token/token_details",
    responses(
        (status = 200, description = "Token details as returned by the upstream"),
        (status = 404, description = "The upstream returned no details"),
        (status = 500, description = "Upstream could not be reached")
    ),
    security(("api_key" = [])),
    tag = "auth"
)]
pub async fn token_details(
    Extension(upstream): Extension<UpstreamClient>,
    Extension(store): Extension<TokenStore>,
) -> Response {
    let token = store
        .get()
        .map(|token| token.expose_secret().to_string())
        .unwrap_or_default();

    let request = match upstream.request(Method::POST, TOKEN_DETAILS_PATH) {
        Ok(request) => request.json(&json!({ "token": token })),
        Err(e) => return internal_error(&e),
    };

    // The token travels in the body here, not in Authorization
    let response = upstream.send(request).await;

    if response.status().is_success() && response.body().is_empty() {
        debug!("Upstream returned no token details");
        return StatusCode::NOT_FOUND.into_response();
    }

    response.into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::{token::tests::SAMPLE_JWT, EgressPolicy};
    use axum::{body::Body, http::Request, routing::post, Router};
    use secrecy::SecretString;
    use std::net::TcpListener;
    use tower::ServiceExt;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn app(server: &MockServer, store: &TokenStore) -> Router {
        let upstream = UpstreamClient::new(
            reqwest::Client::new(),
            Url::parse(&server.uri()).unwrap(),
            store.clone(),
            EgressPolicy::FailClosed,
        );

        Router::new()
            .route("/token/token_details", post(token_details))
            .layer(Extension(upstream))
            .layer(Extension(store.clone()))
    }

    fn details_request() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/token/token_details")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn relays_details_for_current_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_DETAILS_PATH))
            .and(body_json(json!({ "token": SAMPLE_JWT })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "account_ids": ["A1"] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = TokenStore::new();
        store.set(SecretString::from(SAMPLE_JWT.to_string()));

        let response = app(&server, &store)
            .oneshot(details_request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["account_ids"][0], "A1");
    }

    #[tokio::test]
    async fn sends_empty_token_even_when_fail_closed() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_DETAILS_PATH))
            .and(body_json(json!({ "token": "" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = app(&server, &TokenStore::new())
            .oneshot(details_request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn relays_upstream_errors() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_DETAILS_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let response = app(&server, &TokenStore::new())
            .oneshot(details_request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
