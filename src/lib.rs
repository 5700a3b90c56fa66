//! # finam-gateway
//!
//! `finam-gateway` is a small HTTP gateway in front of the Finam Trade API. Callers
//! authenticate to the gateway with a static API key; the gateway authenticates to the
//! upstream with a short-lived JWT it acquires and refreshes on its own.
//!
//! ## Credential lifecycle
//!
//! - **Inbound:** every request passes the API-key gate. The key travels in the
//!   `X-API-KEY` header and is compared against a bcrypt hash; the plaintext key is never
//!   configured on the server. Paths matching an exclusion pattern (health, docs) skip the
//!   check.
//! - **Refresh:** a single background task logs in to `POST /v1/sessions` on a fixed
//!   period, retrying with exponential backoff. Exhausted retries keep the previous token.
//! - **Outbound:** calls to the protected API read the current token and send it verbatim
//!   in the `Authorization` header. Without a token the request goes out unauthenticated
//!   unless the egress policy is `fail-closed`.
//!
//! The refresh task and the request handlers only meet in the token store.

pub mod api;
pub mod cli;
pub mod credentials;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
