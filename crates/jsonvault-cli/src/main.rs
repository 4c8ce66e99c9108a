mod cli;
mod commands;
mod config;
mod storage;

use std::io;

use crate::cli::{Command, ConfigCommand};
use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the JSON store.
fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command => {
            let mut opened = storage::store_from_config(&config, cli.file.as_deref())?;
            let stdout = io::stdout();
            commands::run(command, &mut opened, &mut stdout.lock())?;
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info; keep stdout for command output.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("jsonvault {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let mut config = config.clone();
    if config.data_file.is_none() {
        config.data_file = Some(storage::default_data_file()?);
    }
    let path = config::write_default_if_missing(&config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
