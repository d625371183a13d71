use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No API key configured (set GEMINI_API_KEY or model.api_key)")]
    MissingApiKey,

    #[error("API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider error {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Response blocked by the provider: {0}")]
    Blocked(String),

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Could not decode provider response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl ModelError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ModelError::Provider { status, .. } => Some(*status),
            ModelError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, ModelError::MissingApiKey)
            || matches!(self.status_code(), Some(401) | Some(403))
    }
}
