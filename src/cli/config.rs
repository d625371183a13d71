use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use dermalens::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the config file location
    Path,

    /// Print the effective configuration
    Show,

    /// Write the default config template
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Read a single value (e.g. model.name)
    Get { key: String },

    /// Set a single value and save
    Set { key: String, value: String },
}

fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(PathBuf::from(shellexpand::tilde(p).to_string())),
        None => Config::config_path(),
    }
}

pub fn run(args: ConfigArgs, path: Option<&str>) -> Result<()> {
    let path = resolve_path(path)?;

    match args.command {
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Show => {
            let mut config = Config::load_from(&path)?;
            if config.model.api_key.is_some() {
                config.model.api_key = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::write_template(&path)?;
        }
        ConfigCommands::Get { key } => {
            let config = Config::load_unexpanded(&path)?;
            println!("{}", config.get_value(&key)?);
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load_unexpanded(&path)?;
            config.set_value(&key, &value)?;
            config.validate()?;
            config.save(&path)?;
            println!("{} = {}", key, value);
        }
    }

    Ok(())
}
