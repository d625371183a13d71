//! The image analysis pipeline.
//!
//! Validator -> Encoder -> (PromptBuilder) -> AnalysisClient -> ResultParser,
//! sequenced by [`AnalysisOrchestrator`].

pub mod client;
pub mod encoder;
pub mod error;
pub mod model_error;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod validator;

pub use client::{AnalysisClient, GeminiClient, ModelRequest};
pub use encoder::{EncodeError, EncodedPayload, ImageEncoder};
pub use error::{AnalysisError, ErrorKind};
pub use model_error::ModelError;
pub use orchestrator::{AnalysisOrchestrator, PipelineState, SubmitError};
pub use parser::{AnalysisResult, ParseError, ResultParser};
pub use prompt::PromptBuilder;
pub use validator::{
    ImageCandidate, ImageContent, ImageValidator, RawImage, ValidationError, MAX_IMAGE_BYTES,
};
