use crate::credentials::{refresh::MAX_REFRESH_INTERVAL, RefreshConfig};
use clap::{Arg, Command};

pub const ARG_REFRESH_INTERVAL: &str = "refresh-interval-seconds";
pub const ARG_REFRESH_MAX_ATTEMPTS: &str = "refresh-max-attempts";
pub const ARG_REFRESH_BACKOFF: &str = "refresh-backoff-seconds";

const MAX_INTERVAL_SECONDS: u64 = MAX_REFRESH_INTERVAL.as_secs();
const MAX_BACKOFF_SECONDS: u64 = 60 * 60;

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REFRESH_INTERVAL)
                .long(ARG_REFRESH_INTERVAL)
                .help("Seconds between token refreshes")
                .env("FINAM_GATEWAY_REFRESH_INTERVAL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_REFRESH_MAX_ATTEMPTS)
                .long(ARG_REFRESH_MAX_ATTEMPTS)
                .help("Login attempts per refresh before keeping the previous token")
                .env("FINAM_GATEWAY_REFRESH_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_BACKOFF)
                .long(ARG_REFRESH_BACKOFF)
                .help("Base delay in seconds before the first retry, doubled on each further retry")
                .env("FINAM_GATEWAY_REFRESH_BACKOFF_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(0..=MAX_BACKOFF_SECONDS)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub interval_seconds: u64,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            interval_seconds: matches
                .get_one::<u64>(ARG_REFRESH_INTERVAL)
                .copied()
                .unwrap_or(600),
            max_attempts: matches
                .get_one::<u32>(ARG_REFRESH_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(3),
            backoff_base_seconds: matches
                .get_one::<u64>(ARG_REFRESH_BACKOFF)
                .copied()
                .unwrap_or(5),
        }
    }

    #[must_use]
    pub fn config(&self) -> RefreshConfig {
        RefreshConfig::new()
            .with_interval_seconds(self.interval_seconds)
            .with_max_attempts(self.max_attempts)
            .with_backoff_base_seconds(self.backoff_base_seconds)
            .normalize()
    }
}
