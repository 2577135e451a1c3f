//! Almanac CLI Binary
//!
//! Maintenance surface over the tombstone and sync-state stores.

use almanac::cli::{exit_code, map_error, Cli, RunContext};
use almanac::config::ConfigLoader;
use almanac::logging::{init_logging, LoggingConfig};
use clap::Parser;
use std::process;
use tracing::{debug, error};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(2);
    }

    debug!("Almanac CLI starting");

    let context = match RunContext::new(cli.data_dir.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error initializing database: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(exit_code(&e));
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(exit_code(&e));
        }
    }
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    } else {
        ConfigLoader::load().ok().map(|c| c.logging).unwrap_or_default()
    };

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
    }

    config
}
