use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use secrecy::SecretString;

pub const ARG_API_KEY_HASH: &str = "api-key-hash";
pub const ARG_EXCLUDED_PATHS: &str = "excluded-paths";

pub const DEFAULT_EXCLUDED_PATHS: &str = "/health,/swagger-ui/**,/api-docs/**";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_KEY_HASH)
                .long(ARG_API_KEY_HASH)
                .help("bcrypt hash of the API key clients send in X-API-KEY")
                .long_help(
                    "bcrypt hash of the API key clients send in X-API-KEY. Generate it with the `hash` subcommand; the plaintext key is never configured on the server.",
                )
                .env("FINAM_GATEWAY_API_KEY_HASH")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_EXCLUDED_PATHS)
                .long(ARG_EXCLUDED_PATHS)
                .help("Comma separated glob patterns that skip the API key check, in match order")
                .env("FINAM_GATEWAY_EXCLUDED_PATHS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_value(DEFAULT_EXCLUDED_PATHS),
        )
}

#[derive(Debug)]
pub struct Options {
    pub api_key_hash: SecretString,
    pub excluded_paths: Vec<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if the API key hash is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let api_key_hash = matches
            .get_one::<String>(ARG_API_KEY_HASH)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --api-key-hash")?;

        let excluded_paths = matches
            .get_many::<String>(ARG_EXCLUDED_PATHS)
            .map(|paths| {
                paths
                    .map(|path| path.trim().to_string())
                    .filter(|path| !path.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            api_key_hash,
            excluded_paths,
        })
    }
}
