//! One-way verification of the static API key.
//!
//! Only a bcrypt hash of the key is configured. The cost factor baked into the hash makes
//! each guess expensive, and bcrypt compares the derived digests itself, so callers never
//! see where a mismatch happened.

use anyhow::{Context, Result};
use bcrypt::HashParts;
use tracing::error;

/// Default cost used by the `hash` subcommand.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Check `candidate` against a bcrypt `stored_hash`.
///
/// Returns `false` for an empty candidate and for a hash that cannot be parsed; this
/// function never fails.
#[must_use]
pub fn verify(candidate: &str, stored_hash: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }

    match bcrypt::verify(candidate, stored_hash) {
        Ok(matches) => matches,
        Err(e) => {
            error!("Failed to verify API key against configured hash: {}", e);
            false
        }
    }
}

/// Hash a secret with bcrypt, for producing the configured API-key hash out of band.
///
/// # Errors
/// Returns an error if the cost is outside bcrypt's accepted range (4..=31).
pub fn hash(secret: &str, cost: u32) -> Result<String> {
    bcrypt::hash(secret, cost).context("Failed to hash API key")
}

/// Make sure a configured hash is a well-formed bcrypt hash.
///
/// # Errors
/// Returns an error describing why the hash was rejected.
pub fn validate_hash(stored_hash: &str) -> Result<()> {
    stored_hash
        .parse::<HashParts>()
        .map(|_| ())
        .context("API key hash is not a valid bcrypt hash")
}
