use anyhow::Result;
use clap::Args;

use dermalens::config::Config;
use dermalens::server::Server;

use super::common::build_orchestrator;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

pub async fn run(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let orchestrator = build_orchestrator(&config)?;
    tracing::info!(
        "Using model {} (max upload {} bytes)",
        config.model.name,
        config.upload.max_file_size_bytes
    );

    Server::new(&config, orchestrator).run().await
}
