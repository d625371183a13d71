use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::broadcast::error::RecvError;

use dermalens::analysis::{ImageCandidate, PipelineState, SubmitError};
use dermalens::config::Config;

use super::common::build_orchestrator;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Image file to analyze
    pub file: String,

    /// Model to use (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: AnalyzeArgs, mut config: Config) -> Result<()> {
    if !matches!(args.format.as_str(), "text" | "json") {
        anyhow::bail!("Unknown output format: {} (expected text or json)", args.format);
    }
    if let Some(model) = args.model {
        config.model.name = model;
    }

    let path = shellexpand::tilde(&args.file).to_string();
    let candidate = ImageCandidate::from_path(&path)
        .await
        .with_context(|| format!("Cannot open image: {}", path))?;

    let orchestrator = build_orchestrator(&config)?;

    // Progress goes to stderr so json output stays clean
    let mut events = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PipelineState::AwaitingModel) => eprintln!("Analyzing..."),
                Ok(state) if !state.is_in_flight() => break,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = orchestrator.submit(Some(candidate)).await;
    if let Err(e) = progress.await {
        tracing::debug!("Progress task ended abnormally: {}", e);
    }

    match outcome {
        Ok(result) => {
            if args.format == "json" {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result);
            }
            eprintln!("Analysis complete!");
            Ok(())
        }
        Err(SubmitError::Failed(e)) => {
            tracing::debug!("Analysis error detail: {:?}", e);
            let kind = e.kind();
            if e.is_auth_error() {
                anyhow::bail!(
                    "{} Set GEMINI_API_KEY or model.api_key in the config.",
                    kind.user_message()
                );
            }
            anyhow::bail!("{} {}", kind.user_message(), kind.next_step())
        }
        Err(SubmitError::Busy) => anyhow::bail!("An analysis is already in progress."),
    }
}
