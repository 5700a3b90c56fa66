//! Credential lifecycle: inbound API-key gate, upstream token refresh and injection.
//!
//! The inbound and outbound halves share nothing but the [`TokenStore`]: the refresh task
//! writes it, the upstream client reads it on every call.

pub mod acquirer;
pub mod exclusion;
pub mod gate;
pub mod hasher;
pub mod injector;
pub mod refresh;
pub mod store;
pub mod token;

pub use self::acquirer::{HttpTokenAcquirer, TokenAcquirer};
pub use self::exclusion::ExclusionRule;
pub use self::gate::{require_api_key, ApiKeyGate, GateDecision, RejectReason, API_KEY_HEADER};
pub use self::injector::{EgressPolicy, UpstreamClient, UpstreamResponse};
pub use self::refresh::{RefreshConfig, RefreshOutcome, RefreshScheduler, RefreshStatus};
pub use self::store::TokenStore;
pub use self::token::{AuthError, BearerToken};

use url::Url;

/// Append `path` to `base`, keeping any path prefix the base already carries.
///
/// `Url::join` with an absolute path would drop `/trade` from `https://host/trade/`.
///
/// # Errors
/// Returns an error if the concatenation is not a valid URL.
pub fn endpoint_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
}
