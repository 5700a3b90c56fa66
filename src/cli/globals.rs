use secrecy::SecretString;
use url::Url;

/// Secret-bearing settings shared by the server wiring.
#[derive(Clone)]
pub struct GlobalArgs {
    pub upstream_url: Url,
    pub secret: SecretString,
    pub api_key_hash: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(upstream_url: Url) -> Self {
        Self {
            upstream_url,
            secret: SecretString::from(String::new()),
            api_key_hash: SecretString::from(String::new()),
        }
    }

    pub fn set_secret(&mut self, secret: SecretString) {
        self.secret = secret;
    }

    pub fn set_api_key_hash(&mut self, api_key_hash: SecretString) {
        self.api_key_hash = api_key_hash;
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("upstream_url", &self.upstream_url.as_str())
            .field("secret", &"***")
            .field("api_key_hash", &"***")
            .finish()
    }
}
