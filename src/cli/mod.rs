pub mod analyze;
pub mod common;
pub mod config;
pub mod prompt;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dermalens")]
#[command(author, version, about = "Structured skin condition reports from a photograph")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "DERMALENS_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a single image
    Analyze(analyze::AnalyzeArgs),

    /// Serve the upload and state endpoints over HTTP
    Serve(serve::ServeArgs),

    /// Print the instruction sent to the model
    Prompt,

    /// Configuration management
    Config(config::ConfigArgs),
}
