use crate::credentials::EgressPolicy;
use anyhow::{anyhow, Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const ARG_UPSTREAM_URL: &str = "upstream-url";
pub const ARG_SECRET: &str = "secret";
pub const ARG_CONNECT_TIMEOUT: &str = "connect-timeout-seconds";
pub const ARG_READ_TIMEOUT: &str = "read-timeout-seconds";
pub const ARG_REQUEST_TIMEOUT: &str = "request-timeout-seconds";
pub const ARG_EGRESS_POLICY: &str = "egress-policy";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_UPSTREAM_URL)
                .long(ARG_UPSTREAM_URL)
                .help("Base URL of the upstream API, example: https://trade-api.finam.ru")
                .env("FINAM_GATEWAY_UPSTREAM_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SECRET)
                .long(ARG_SECRET)
                .help("Secret exchanged for a session token at POST /v1/sessions")
                .env("FINAM_GATEWAY_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_CONNECT_TIMEOUT)
                .long(ARG_CONNECT_TIMEOUT)
                .help("Upstream connect timeout in seconds")
                .env("FINAM_GATEWAY_CONNECT_TIMEOUT_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_READ_TIMEOUT)
                .long(ARG_READ_TIMEOUT)
                .help("Upstream read timeout in seconds")
                .env("FINAM_GATEWAY_READ_TIMEOUT_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT)
                .long(ARG_REQUEST_TIMEOUT)
                .help("Upstream total request timeout in seconds, covers sending the body")
                .env("FINAM_GATEWAY_REQUEST_TIMEOUT_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_EGRESS_POLICY)
                .long(ARG_EGRESS_POLICY)
                .help("What to do with upstream calls while no token is available")
                .env("FINAM_GATEWAY_EGRESS_POLICY")
                .default_value("fail-open")
                .value_parser(["fail-open", "fail-closed"]),
        )
}

#[derive(Debug)]
pub struct Options {
    pub url: Url,
    pub secret: SecretString,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub request_timeout: Duration,
    pub egress_policy: EgressPolicy,
}

impl Options {
    /// # Errors
    /// Returns an error if the upstream URL or secret is missing or invalid.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let url = matches
            .get_one::<String>(ARG_UPSTREAM_URL)
            .context("missing required argument: --upstream-url")?;
        let url = Url::parse(url).context("invalid FINAM_GATEWAY_UPSTREAM_URL")?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "upstream URL must use http or https, got: {}",
                url.scheme()
            ));
        }

        let secret = matches
            .get_one::<String>(ARG_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --secret")?;

        let seconds = |id: &str, default: u64| {
            Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(default))
        };

        let egress_policy = matches
            .get_one::<String>(ARG_EGRESS_POLICY)
            .map(|policy| policy.parse::<EgressPolicy>())
            .transpose()
            .map_err(|e| anyhow!(e))?
            .unwrap_or_default();

        Ok(Self {
            url,
            secret,
            connect_timeout: seconds(ARG_CONNECT_TIMEOUT, 30),
            read_timeout: seconds(ARG_READ_TIMEOUT, 30),
            request_timeout: seconds(ARG_REQUEST_TIMEOUT, 60),
            egress_policy,
        })
    }
}
