//! Outbound client for the protected upstream API.
//!
//! Every call made through [`UpstreamClient::send_authorized`] carries the current token
//! verbatim in the `Authorization` header (no scheme prefix). Transport failures never
//! escape as errors: they become a synthesized 500 [`UpstreamResponse`].

use super::{endpoint_url, store::TokenStore};
use axum::{
    body::Bytes,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use reqwest::{Client, Method, Request, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::{debug, error, info_span, warn, Instrument};
use url::Url;

/// What to do with an outbound call when no token is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EgressPolicy {
    /// Send the request without credentials.
    #[default]
    FailOpen,
    /// Answer 503 locally without contacting the upstream.
    FailClosed,
}

impl EgressPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FailOpen => "fail-open",
            Self::FailClosed => "fail-closed",
        }
    }
}

impl FromStr for EgressPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-open" => Ok(Self::FailOpen),
            "fail-closed" => Ok(Self::FailClosed),
            other => Err(format!("invalid egress policy: {other}")),
        }
    }
}

impl fmt::Display for EgressPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("No upstream credential is available")]
pub struct CredentialUnavailable;

/// Fully buffered upstream answer, or a locally synthesized one.
#[derive(Debug)]
pub struct UpstreamResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
    diagnostic: Option<String>,
}

impl UpstreamResponse {
    async fn read(response: reqwest::Response) -> Self {
        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();

        match response.bytes().await {
            Ok(body) => Self {
                status,
                content_type,
                body,
                diagnostic: None,
            },
            Err(e) => {
                error!("I/O error when reading upstream response: {}", e);
                Self::internal_error(&e)
            }
        }
    }

    /// Synthesized 500 carrying the cause as diagnostic text.
    #[must_use]
    pub fn internal_error(cause: &dyn fmt::Display) -> Self {
        let diagnostic = cause.to_string();
        Self::synthesized(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            Some(diagnostic),
        )
    }

    fn credential_unavailable() -> Self {
        Self::synthesized(
            StatusCode::SERVICE_UNAVAILABLE,
            &CredentialUnavailable.to_string(),
            None,
        )
    }

    fn synthesized(status: StatusCode, message: &str, diagnostic: Option<String>) -> Self {
        let body = match &diagnostic {
            Some(cause) => json!({ "message": message, "cause": cause }),
            None => json!({ "message": message }),
        };

        Self {
            status,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from(body.to_string()),
            diagnostic,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Cause of a synthesized failure, `None` for real upstream answers.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Decode a successful body.
    ///
    /// # Errors
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();

        match self.content_type {
            Some(content_type) => {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            None => {
                response.headers_mut().remove(CONTENT_TYPE);
            }
        }

        response
    }
}

#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: Client,
    base_url: Url,
    store: TokenStore,
    policy: EgressPolicy,
}

impl UpstreamClient {
    #[must_use]
    pub fn new(client: Client, base_url: Url, store: TokenStore, policy: EgressPolicy) -> Self {
        Self {
            client,
            base_url,
            store,
            policy,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn policy(&self) -> EgressPolicy {
        self.policy
    }

    /// Start a request to `path` under the upstream base URL.
    ///
    /// # Errors
    /// Returns an error if `path` does not form a valid URL with the base.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, url::ParseError> {
        let url = endpoint_url(&self.base_url, path)?;
        Ok(self.request_url(method, url))
    }

    /// Start a request to an already resolved upstream URL.
    #[must_use]
    pub fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Attach the current token to `request`.
    ///
    /// Without a usable token the request is returned unchanged under
    /// [`EgressPolicy::FailOpen`] and refused under [`EgressPolicy::FailClosed`].
    ///
    /// # Errors
    /// Returns `CredentialUnavailable` only under the fail-closed policy.
    pub fn inject(&self, mut request: Request) -> Result<Request, CredentialUnavailable> {
        debug!("Token injection started for request: {}", request.url());

        let header = self.store.get().and_then(|token| {
            let token = token.expose_secret();
            if token.is_empty() {
                return None;
            }

            match HeaderValue::from_str(token) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    Some(value)
                }
                Err(e) => {
                    error!("Stored token is not a valid header value: {}", e);
                    None
                }
            }
        });

        match (header, self.policy) {
            (Some(value), _) => {
                request.headers_mut().insert(AUTHORIZATION, value);
                debug!("Added upstream token to request headers");
                Ok(request)
            }
            (None, EgressPolicy::FailOpen) => {
                warn!("No upstream token available, sending request without authentication");
                Ok(request)
            }
            (None, EgressPolicy::FailClosed) => {
                warn!("No upstream token available, refusing to send request");
                Err(CredentialUnavailable)
            }
        }
    }

    /// Build, authorize and send a request.
    pub async fn send_authorized(&self, builder: RequestBuilder) -> UpstreamResponse {
        let request = match builder.build() {
            Ok(request) => request,
            Err(e) => {
                error!("Failed to build upstream request: {}", e);
                return UpstreamResponse::internal_error(&e);
            }
        };

        match self.inject(request) {
            Ok(request) => self.execute(request).await,
            Err(CredentialUnavailable) => UpstreamResponse::credential_unavailable(),
        }
    }

    /// Build and send a request as-is, without touching credentials.
    pub async fn send(&self, builder: RequestBuilder) -> UpstreamResponse {
        match builder.build() {
            Ok(request) => self.execute(request).await,
            Err(e) => {
                error!("Failed to build upstream request: {}", e);
                UpstreamResponse::internal_error(&e)
            }
        }
    }

    /// Send a request, turning transport failures into a synthesized 500.
    pub async fn execute(&self, request: Request) -> UpstreamResponse {
        let url = request.url().clone();
        let span = info_span!(
            "upstream.request",
            http.method = %request.method(),
            url = %url
        );

        match self.client.execute(request).instrument(span).await {
            Ok(response) => UpstreamResponse::read(response).await,
            Err(e) => {
                error!("I/O error when forwarding request to {}: {}", url, e);
                UpstreamResponse::internal_error(&e)
            }
        }
    }
}
