use clap::{Arg, Command};

pub const CMD_HASH: &str = "hash";
pub const ARG_API_KEY: &str = "api-key";
pub const ARG_COST: &str = "cost";

#[must_use]
pub fn command() -> Command {
    Command::new(CMD_HASH)
        .about("Print the bcrypt hash of an API key, for use with --api-key-hash")
        .arg(
            Arg::new(ARG_API_KEY)
                .long(ARG_API_KEY)
                .help("API key to hash")
                .env("FINAM_GATEWAY_API_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_COST)
                .long(ARG_COST)
                .help("bcrypt cost factor")
                .default_value("12")
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
}
