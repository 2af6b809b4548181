//! CLI entry point: argument parsing, tracing setup, error display, exit
//! code mapping.

use appstract::cli::Cli;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level())),
        )
        .init();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(err) = cli.execute().await {
        eprintln!("{}", format!("[err] {err:#}").red());
        std::process::exit(1);
    }
}
