use anyhow::{Context, Result};
use std::sync::Arc;

use dermalens::analysis::{AnalysisOrchestrator, GeminiClient, ImageValidator};
use dermalens::config::Config;

/// Wire the pipeline to the Gemini client described by `config`.
pub fn build_orchestrator(config: &Config) -> Result<Arc<AnalysisOrchestrator>> {
    let client = GeminiClient::new(&config.model).context("Failed to create model client")?;
    let validator = ImageValidator::new(config.upload.max_file_size_bytes);

    Ok(Arc::new(AnalysisOrchestrator::new(validator, Arc::new(client))))
}
