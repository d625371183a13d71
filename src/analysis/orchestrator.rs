//! Drives one analysis at a time through validate, encode, model call and
//! parse, publishing every stage as a [`PipelineState`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::client::AnalysisClient;
use super::encoder::ImageEncoder;
use super::error::{AnalysisError, ErrorKind};
use super::parser::{AnalysisResult, ResultParser};
use super::prompt::PromptBuilder;
use super::validator::{ImageCandidate, ImageValidator};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Encoding,
    AwaitingModel,
    ParsingResponse,
    Succeeded(AnalysisResult),
    Failed(ErrorKind),
}

impl PipelineState {
    /// True while a submission is between acceptance and its outcome.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PipelineState::Validating
                | PipelineState::Encoding
                | PipelineState::AwaitingModel
                | PipelineState::ParsingResponse
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::Encoding => "encoding",
            PipelineState::AwaitingModel => "awaiting_model",
            PipelineState::ParsingResponse => "parsing_response",
            PipelineState::Succeeded(_) => "succeeded",
            PipelineState::Failed(_) => "failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("An analysis is already in progress")]
    Busy,

    #[error(transparent)]
    Failed(#[from] AnalysisError),
}

pub struct AnalysisOrchestrator {
    validator: ImageValidator,
    encoder: ImageEncoder,
    prompts: PromptBuilder,
    parser: ResultParser,
    client: Arc<dyn AnalysisClient>,
    state: watch::Sender<PipelineState>,
    events: broadcast::Sender<PipelineState>,
}

impl AnalysisOrchestrator {
    pub fn new(validator: ImageValidator, client: Arc<dyn AnalysisClient>) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            validator,
            encoder: ImageEncoder,
            prompts: PromptBuilder,
            parser: ResultParser,
            client,
            state,
            events,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Receiver that always holds the latest state.
    pub fn watch(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Receiver of every transition made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineState> {
        self.events.subscribe()
    }

    /// Run one analysis. Rejected with [`SubmitError::Busy`] while another
    /// submission is in flight; the running one is left untouched.
    ///
    /// On failure the state passes through `Failed(kind)` back to `Idle`. On
    /// success it stays `Succeeded` until the next submission.
    pub async fn submit(
        &self,
        candidate: Option<ImageCandidate>,
    ) -> Result<AnalysisResult, SubmitError> {
        let accepted = self.state.send_if_modified(|state| {
            if state.is_in_flight() {
                false
            } else {
                *state = PipelineState::Validating;
                true
            }
        });
        if !accepted {
            warn!("Submission rejected: analysis already in progress");
            return Err(SubmitError::Busy);
        }
        let _ = self.events.send(PipelineState::Validating);
        debug!("Pipeline -> validating");

        let mut guard = InFlight {
            orchestrator: self,
            settled: false,
        };

        let outcome = self.run(candidate).await;
        guard.settled = true;

        match outcome {
            Ok(result) => {
                info!("Analysis complete: {}", result.diagnosis);
                self.transition(PipelineState::Succeeded(result.clone()));
                Ok(result)
            }
            Err(e) => {
                let kind = e.kind();
                match &e {
                    AnalysisError::Model(model) => warn!(
                        status = ?model.status_code(),
                        auth = model.is_auth_error(),
                        "Analysis failed ({:?}): {}",
                        kind,
                        e
                    ),
                    _ => warn!("Analysis failed ({:?}): {}", kind, e),
                }
                self.transition(PipelineState::Failed(kind));
                self.transition(PipelineState::Idle);
                Err(SubmitError::Failed(e))
            }
        }
    }

    async fn run(&self, candidate: Option<ImageCandidate>) -> Result<AnalysisResult, AnalysisError> {
        let image = self.validator.validate(candidate)?;

        self.transition(PipelineState::Encoding);
        let payload = self.encoder.encode(image).await?;
        let prompt = self.prompts.build();

        self.transition(PipelineState::AwaitingModel);
        let raw = self.client.analyze(&payload, prompt).await?;
        debug!("Model returned {} chars", raw.len());

        self.transition(PipelineState::ParsingResponse);
        Ok(self.parser.parse(&raw)?)
    }

    fn transition(&self, next: PipelineState) {
        debug!("Pipeline -> {}", next.label());
        self.state.send_replace(next.clone());
        let _ = self.events.send(next);
    }
}

// Returns the pipeline to Idle if a submit future is dropped mid-flight.
struct InFlight<'a> {
    orchestrator: &'a AnalysisOrchestrator,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Analysis abandoned before completion");
            self.orchestrator.transition(PipelineState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::encoder::EncodedPayload;
    use crate::analysis::model_error::ModelError;
    use async_trait::async_trait;

    struct Canned(&'static str);

    #[async_trait]
    impl AnalysisClient for Canned {
        async fn analyze(&self, _: &EncodedPayload, _: &str) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }
    }

    fn orchestrator(reply: &'static str) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(ImageValidator::default(), Arc::new(Canned(reply)))
    }

    fn png() -> Option<ImageCandidate> {
        Some(ImageCandidate::from_bytes("a.png", "image/png", vec![7; 64]))
    }

    #[test]
    fn test_in_flight_states() {
        assert!(PipelineState::AwaitingModel.is_in_flight());
        assert!(!PipelineState::Idle.is_in_flight());
        assert!(!PipelineState::Failed(ErrorKind::Model).is_in_flight());
    }

    #[tokio::test]
    async fn test_starts_idle() {
        assert_eq!(orchestrator("{}").state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_failure_returns_to_idle() {
        let orch = orchestrator("not json");
        let mut events = orch.subscribe();

        let err = orch.submit(png()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Failed(ref e) if e.kind() == ErrorKind::SyntaxViolation));
        assert_eq!(orch.state(), PipelineState::Idle);

        let mut seen = Vec::new();
        while let Ok(state) = events.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                PipelineState::Validating,
                PipelineState::Encoding,
                PipelineState::AwaitingModel,
                PipelineState::ParsingResponse,
                PipelineState::Failed(ErrorKind::SyntaxViolation),
                PipelineState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_success_clears_on_next_submission() {
        let orch = orchestrator(
            r#"{"diagnosis":"Eczema","measures":["Moisturize"],"prevention":["Avoid irritants"],"diet":["Oily fish"]}"#,
        );
        let result = orch.submit(png()).await.unwrap();
        assert!(matches!(orch.state(), PipelineState::Succeeded(ref r) if *r == result));

        let mut watch = orch.watch();
        let err = orch.submit(None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Failed(ref e) if e.kind() == ErrorKind::Empty));
        assert!(watch.has_changed().unwrap());
        assert_eq!(*watch.borrow_and_update(), PipelineState::Idle);
    }
}
