use clap::{Parser, Subcommand};

pub mod config;
pub mod password;
pub mod seal;
pub mod status;
pub mod unlock;
pub mod version;

use config::{ConfigError, SigilConfig};

#[derive(Parser)]
#[command(name = "sigil")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local identity store and protocol engine bridge", long_about = None)]
pub struct Cli {
    /// Path to config file (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Unlock the identity and register it with the protocol engine
    Unlock {
        /// Path to file containing the identity password
        #[arg(long)]
        password_file: Option<String>,
    },

    /// Protect a plain identity with a password
    Seal {
        /// Path to file containing the new password
        #[arg(long)]
        password_file: Option<String>,
    },

    /// Show identity store status without unlocking
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a commented default config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

impl Cli {
    /// Resolve configuration from `--config` / `--data-dir`
    pub fn load_config(&self) -> Result<SigilConfig, ConfigError> {
        SigilConfig::resolve(
            self.config.as_deref().map(std::path::Path::new),
            self.data_dir.as_deref().map(std::path::Path::new),
        )
    }
}

pub async fn execute(cli: Cli, config: SigilConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Unlock { password_file } => unlock::execute(&config, password_file).await,
        Commands::Seal { password_file } => seal::execute(&config, password_file),
        Commands::Status { json } => status::execute(&config, json),
        Commands::InitConfig { force } => {
            init_config(cli.config.as_deref().map(std::path::Path::new), &config, force)
        }
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

fn init_config(
    path: Option<&std::path::Path>,
    config: &SigilConfig,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.map_or_else(
        || config::default_config_path(&config.storage.data_dir),
        std::path::Path::to_path_buf,
    );
    if path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    SigilConfig::create_default(&path, &config.storage.data_dir)?;
    println!("✅ Wrote {}", path.display());
    Ok(())
}
