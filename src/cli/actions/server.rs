use crate::{
    api,
    cli::globals::GlobalArgs,
    credentials::{exclusion, ApiKeyGate, EgressPolicy, RefreshConfig},
    APP_USER_AGENT,
};
use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::SecretString;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub api_key_hash: SecretString,
    pub excluded_paths: Vec<String>,
    pub upstream_url: Url,
    pub secret: SecretString,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub request_timeout: Duration,
    pub egress_policy: EgressPolicy,
    pub refresh: RefreshConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let mut globals = GlobalArgs::new(args.upstream_url);
    globals.set_secret(args.secret);
    globals.set_api_key_hash(args.api_key_hash);

    debug!("Global args: {:?}", globals);

    let exclusions =
        exclusion::compile(&args.excluded_paths).context("Invalid FINAM_GATEWAY_EXCLUDED_PATHS")?;

    let gate = ApiKeyGate::new(globals.api_key_hash.clone(), exclusions)
        .context("Invalid FINAM_GATEWAY_API_KEY_HASH")?;

    let client = Client::builder()
        .user_agent(APP_USER_AGENT)
        .connect_timeout(args.connect_timeout)
        .read_timeout(args.read_timeout)
        .timeout(args.request_timeout)
        .build()
        .context("Failed to build upstream HTTP client")?;

    api::new(
        args.port,
        &globals,
        client,
        gate,
        args.egress_policy,
        args.refresh,
    )
    .await
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        upstream_url = %args.upstream_url,
        egress_policy = %args.egress_policy,
        excluded_paths = ?args.excluded_paths,
        refresh_interval_seconds = args.refresh.interval().as_secs(),
        refresh_max_attempts = args.refresh.max_attempts(),
        "Starting finam-gateway"
    );
}
