//! Map validated CLI matches to an [`Action`].

use crate::cli::actions::{hash, server, Action};
use crate::cli::commands::{gate, hash as hash_cmd, refresh, upstream};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub_m) = matches.subcommand_matches(hash_cmd::CMD_HASH) {
        return hash_action(sub_m);
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let gate_opts = gate::Options::parse(matches)?;
    let upstream_opts = upstream::Options::parse(matches)?;
    let refresh_opts = refresh::Options::parse(matches);

    Ok(Action::Server(server::Args {
        port,
        api_key_hash: gate_opts.api_key_hash,
        excluded_paths: gate_opts.excluded_paths,
        upstream_url: upstream_opts.url,
        secret: upstream_opts.secret,
        connect_timeout: upstream_opts.connect_timeout,
        read_timeout: upstream_opts.read_timeout,
        request_timeout: upstream_opts.request_timeout,
        egress_policy: upstream_opts.egress_policy,
        refresh: refresh_opts.config(),
    }))
}

fn hash_action(matches: &clap::ArgMatches) -> Result<Action> {
    let api_key = matches
        .get_one::<String>(hash_cmd::ARG_API_KEY)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --api-key")?;
    let cost = matches
        .get_one::<u32>(hash_cmd::ARG_COST)
        .copied()
        .unwrap_or(crate::credentials::hasher::DEFAULT_COST);

    Ok(Action::Hash(hash::Args { api_key, cost }))
}
