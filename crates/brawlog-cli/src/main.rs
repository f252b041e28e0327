mod cli;
mod commands;
mod console;
mod shutdown;

use anyhow::Result;
use brawlog_core::Config;
use clap::Parser;
use cli::{Args, Command};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("brawlog_cli=info,brawlog_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args);

    match args.command {
        Command::Capture { log, output } => {
            commands::capture::run(&config, log.as_deref(), output.as_deref())
        }
        Command::Continue { store, log } => {
            commands::continue_capture::run(&config, &store, log.as_deref())
        }
        Command::Import {
            input,
            output,
            format,
            upgrade,
        } => commands::import::run(&config, &input, &output, format, &upgrade),
        Command::Reparse {
            input,
            output,
            upgrade,
        } => commands::reparse::run(&config, &input, &output, &upgrade),
        Command::Scan { log, json } => commands::scan::run(&config, log.as_deref(), json),
        Command::Summary { store, json } => commands::summary::run(&store, json),
    }
}

fn load_config(args: &Args) -> Config {
    if !args.config.exists() {
        warn!("Config {} not found, using defaults", args.config.display());
        return Config::default();
    }
    match Config::load(&args.config) {
        Ok(config) => {
            info!("Loaded config from {}", args.config.display());
            config
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    }
}
