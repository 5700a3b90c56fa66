//! Login exchange against the upstream session endpoint.

use super::{
    endpoint_url,
    token::{AuthError, BearerToken},
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::future::Future;
use tracing::{debug, error, info_span, instrument, Instrument};
use url::Url;

pub const LOGIN_PATH: &str = "/v1/sessions";

/// Something that can trade the long-lived secret for a fresh bearer token.
pub trait TokenAcquirer: Send + Sync {
    fn login(
        &self,
        secret: &SecretString,
    ) -> impl Future<Output = Result<BearerToken, AuthError>> + Send;
}

/// `POST /v1/sessions` with `{"secret": ..}`, expecting `{"token": ..}` back.
#[derive(Clone, Debug)]
pub struct HttpTokenAcquirer {
    client: Client,
    login_url: Url,
}

impl HttpTokenAcquirer {
    /// # Errors
    /// Returns `AuthError::Endpoint` if the login URL cannot be derived from `base_url`.
    pub fn new(client: Client, base_url: &Url) -> Result<Self, AuthError> {
        let login_url = endpoint_url(base_url, LOGIN_PATH)?;
        Ok(Self { client, login_url })
    }

    #[must_use]
    pub fn login_url(&self) -> &Url {
        &self.login_url
    }
}

impl TokenAcquirer for HttpTokenAcquirer {
    #[instrument(skip(self, secret), fields(url = %self.login_url))]
    async fn login(&self, secret: &SecretString) -> Result<BearerToken, AuthError> {
        let payload = json!({ "secret": secret.expose_secret() });

        let span = info_span!(
            "upstream.login",
            http.method = "POST",
            url = %self.login_url
        );
        let response = self
            .client
            .post(self.login_url.clone())
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .map_err(AuthError::Transport)?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token retrieval failed with status code: {}", status);
            return Err(AuthError::Rejected { status, body });
        }

        let body = response.bytes().await.map_err(AuthError::Transport)?;
        let json_response: Value =
            serde_json::from_slice(&body).map_err(|e| AuthError::InvalidBody(e.to_string()))?;

        let token = json_response
            .get("token")
            .and_then(Value::as_str)
            .ok_or(AuthError::MissingToken)?;

        let token = BearerToken::parse(token)?;

        debug!("Login exchange returned a well-formed token");

        Ok(token)
    }
}
