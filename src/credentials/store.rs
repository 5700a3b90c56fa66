//! Holder of the current upstream bearer token.
//!
//! The refresh task is the only writer; request handlers read on every outbound call.
//! The token is replaced wholesale, so a reader sees either the previous or the new value.

use secrecy::SecretString;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Clone, Default)]
pub struct TokenStore {
    current: Arc<RwLock<Option<SecretString>>>,
}

impl TokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token.
    pub fn set(&self, token: SecretString) {
        // The guarded value is swapped in one assignment, a poisoned lock still holds a
        // complete token.
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Some(token);
        drop(current);

        info!("New upstream token has been stored");
    }

    /// Copy of the current token, `None` until the first successful refresh.
    #[must_use]
    pub fn get(&self) -> Option<SecretString> {
        let token = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if token.is_none() {
            debug!("No upstream token present");
        }

        token
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("token", &if self.is_present() { "***" } else { "none" })
            .finish()
    }
}
