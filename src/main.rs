use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{Cli, Commands};
use dermalens::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Config subcommands manage the file themselves and must work even when it is invalid
    let config = match cli.command {
        Commands::Config(_) | Commands::Prompt => Config::default(),
        _ => Config::load(cli.config.as_deref())?,
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze(args) => cli::analyze::run(args, config).await,
        Commands::Serve(args) => cli::serve::run(args, config).await,
        Commands::Prompt => cli::prompt::run(),
        Commands::Config(args) => cli::config::run(args, cli.config.as_deref()),
    }
}
