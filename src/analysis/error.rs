use serde::Serialize;
use thiserror::Error;

use super::encoder::EncodeError;
use super::model_error::ModelError;
use super::parser::ParseError;
use super::validator::ValidationError;

/// A failed analysis attempt, carrying the stage error for operators.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Flat failure category exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Empty,
    TooLarge,
    UnsupportedType,
    Io,
    Model,
    SyntaxViolation,
    SchemaViolation,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Validation(ValidationError::Empty) => ErrorKind::Empty,
            AnalysisError::Validation(ValidationError::TooLarge { .. }) => ErrorKind::TooLarge,
            AnalysisError::Validation(ValidationError::UnsupportedType(_)) => {
                ErrorKind::UnsupportedType
            }
            AnalysisError::Encode(_) => ErrorKind::Io,
            AnalysisError::Model(_) => ErrorKind::Model,
            AnalysisError::Parse(ParseError::SyntaxViolation(_)) => ErrorKind::SyntaxViolation,
            AnalysisError::Parse(ParseError::SchemaViolation { .. }) => ErrorKind::SchemaViolation,
        }
    }

    /// The model rejected our credentials, or none were configured.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, AnalysisError::Model(e) if e.is_auth_error())
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Empty => "empty",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::Io => "io",
            ErrorKind::Model => "model",
            ErrorKind::SyntaxViolation => "syntax_violation",
            ErrorKind::SchemaViolation => "schema_violation",
        }
    }

    /// Short message safe to show an end user. Never includes error detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Empty => "Upload an image first.",
            ErrorKind::TooLarge => "Image must be under 5MB",
            ErrorKind::UnsupportedType => "Only image files can be analyzed.",
            ErrorKind::Io => "Failed to analyze image. The file could not be read.",
            ErrorKind::Model => "Failed to analyze image. The analysis service is unavailable.",
            ErrorKind::SyntaxViolation | ErrorKind::SchemaViolation => {
                "Failed to analyze image. The analysis came back in an unexpected format."
            }
        }
    }

    /// Validation failures need a different file; everything else may succeed
    /// if the same file is submitted again.
    pub fn needs_new_selection(&self) -> bool {
        matches!(
            self,
            ErrorKind::Empty | ErrorKind::TooLarge | ErrorKind::UnsupportedType
        )
    }

    pub fn next_step(&self) -> &'static str {
        if self.needs_new_selection() {
            "Select a different file."
        } else {
            "Try again."
        }
    }
}
