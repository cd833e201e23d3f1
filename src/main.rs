mod cli;

use std::fs::OpenOptions;
use std::sync::Mutex;

use clap::Parser;
use cli::config::LoggingConfig;
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("Error: failed to initialise logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = cli::execute(cli, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| e as Box<dyn std::error::Error>)?;
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| e as Box<dyn std::error::Error>)?,
    }
    Ok(())
}
