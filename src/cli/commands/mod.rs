pub mod gate;
pub mod hash;
pub mod logging;
pub mod refresh;
pub mod upstream;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("finam-gateway")
        .about("API-key protected gateway for the Finam Trade API")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_negates_reqs(true)
        .subcommand(hash::command())
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("FINAM_GATEWAY_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = gate::with_args(command);
    let command = upstream::with_args(command);
    let command = refresh::with_args(command);
    logging::with_args(command)
}
