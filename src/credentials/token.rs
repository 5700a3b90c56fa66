use base64ct::{Base64UrlUnpadded, Encoding};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Failure of a login exchange against the upstream.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid login endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("login request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("upstream rejected login with status {status}")]
    Rejected { status: StatusCode, body: String },
    #[error("login response is not valid JSON: {0}")]
    InvalidBody(String),
    #[error("login response does not contain a token")]
    MissingToken,
    #[error("expected token to contain exactly three dot-separated base64url segments")]
    MalformedToken,
}

impl AuthError {
    /// Upstream HTTP status, when the upstream answered at all.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// A JWT returned by the login exchange.
///
/// Only the shape is checked (`header.payload.signature`, each segment unpadded
/// base64url); the signature and expiry are the upstream's business.
#[derive(Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// # Errors
    /// Returns `AuthError::MalformedToken` if `raw` is not a three-segment JWT.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = raw.split('.').collect();

        if segments.len() != 3 {
            return Err(AuthError::MalformedToken);
        }

        for segment in segments {
            if segment.is_empty() || Base64UrlUnpadded::decode_vec(segment).is_err() {
                return Err(AuthError::MalformedToken);
            }
        }

        Ok(Self(SecretString::from(raw.to_string())))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    #[must_use]
    pub fn into_secret(self) -> SecretString {
        self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}
