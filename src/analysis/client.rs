use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::encoder::EncodedPayload;
use super::model_error::ModelError;
use crate::config::ModelConfig;

/// Environment variable consulted when the config carries no usable key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Stop sequences that cut off hedging boilerplate appended after the JSON.
pub const STOP_SEQUENCES: [&str; 2] = ["\n\nNote:", "Disclaimer:"];

/// The capability the pipeline needs from a multimodal model: one image and
/// one instruction in, raw text out. Single call, no retries.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, image: &EncodedPayload, prompt: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodingConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            stop_sequences: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmBlockThreshold {
    #[serde(rename = "BLOCK_ONLY_HIGH")]
    BlockOnlyHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Harassment is only blocked at high severity so plain anatomical
/// descriptions are not filtered.
pub fn default_safety_policy() -> Vec<SafetySetting> {
    vec![SafetySetting {
        category: HarmCategory::Harassment,
        threshold: HarmBlockThreshold::BlockOnlyHigh,
    }]
}

/// One `generateContent` call. Built fresh for every analysis.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub image: &'a EncodedPayload,
    pub prompt: &'a str,
    pub decoding: DecodingConfig,
    pub safety: Vec<SafetySetting>,
}

impl<'a> ModelRequest<'a> {
    pub fn new(image: &'a EncodedPayload, prompt: &'a str) -> Self {
        Self {
            image,
            prompt,
            decoding: DecodingConfig::default(),
            safety: default_safety_policy(),
        }
    }

    /// The request body in Gemini's wire shape: the image and the
    /// instruction as two user turns, then sampling and safety settings.
    pub fn body(&self) -> GenerateContentBody<'_> {
        GenerateContentBody {
            contents: [
                Content {
                    role: "user",
                    parts: [Part::InlineData {
                        mime_type: self.image.mime_type(),
                        data: self.image.data(),
                    }],
                },
                Content {
                    role: "user",
                    parts: [Part::Text(self.prompt)],
                },
            ],
            generation_config: &self.decoding,
            safety_settings: &self.safety,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentBody<'a> {
    contents: [Content<'a>; 2],
    generation_config: &'a DecodingConfig,
    safety_settings: &'a [SafetySetting],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
enum Part<'a> {
    #[serde(rename = "inline_data")]
    InlineData { mime_type: &'a str, data: &'a str },
    #[serde(rename = "text")]
    Text(&'a str),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`AnalysisClient`] backed by the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    // Resolved per call so a missing key only fails the submission that needs it.
    fn api_key(&self) -> Result<String, ModelError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.starts_with('$'))
            .map(str::to_string)
            .or_else(|| {
                std::env::var(API_KEY_ENV)
                    .ok()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
            })
            .ok_or(ModelError::MissingApiKey)
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze(&self, image: &EncodedPayload, prompt: &str) -> Result<String, ModelError> {
        let api_key = self.api_key()?;
        let request = ModelRequest::new(image, prompt);
        let start = Instant::now();

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(
            "Model {} answered {} in {}ms",
            self.model,
            status,
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!("Model request failed with {}: {}", status, message);
            return Err(ModelError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        extract_text(serde_json::from_str(&body)?)
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, ModelError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ModelError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(ModelError::EmptyResponse)?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some("SAFETY") => Err(ModelError::Blocked("SAFETY".to_string())),
            _ => Err(ModelError::EmptyResponse),
        };
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::encoder::ImageEncoder;
    use crate::analysis::validator::{ImageCandidate, ImageValidator};
    use serde_json::json;

    async fn payload() -> EncodedPayload {
        let image = ImageValidator::default()
            .validate(Some(ImageCandidate::from_bytes("a.jpg", "image/jpeg", vec![1, 2, 3])))
            .unwrap();
        ImageEncoder.encode(image).await.unwrap()
    }

    #[tokio::test]
    async fn test_request_body_shape() {
        let image = payload().await;
        let request = ModelRequest::new(&image, "describe");
        let body = serde_json::to_value(request.body()).unwrap();

        assert_eq!(
            body,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"inline_data": {"mime_type": "image/jpeg", "data": "AQID"}}]},
                    {"role": "user", "parts": [{"text": "describe"}]}
                ],
                "generationConfig": {
                    "temperature": 0.7,
                    "topP": 0.9,
                    "topK": 40,
                    "stopSequences": ["\n\nNote:", "Disclaimer:"]
                },
                "safetySettings": [
                    {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_ONLY_HIGH"}
                ]
            })
        );
    }

    #[test]
    fn test_endpoint() {
        let config = ModelConfig {
            api_base: "https://example.test/v1beta/".to_string(),
            ..Default::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );

        let config = ModelConfig {
            name: "models/gemini-2.0-flash".to_string(),
            ..config
        };
        let client = GeminiClient::new(&config).unwrap();
        assert!(client.endpoint().ends_with("/models/gemini-2.0-flash:generateContent"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(matches!(extract_text(response), Err(ModelError::Blocked(r)) if r == "SAFETY"));
    }

    #[test]
    fn test_extract_text_safety_finish() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(matches!(extract_text(response), Err(ModelError::Blocked(_))));
    }

    #[test]
    fn test_extract_text_no_candidates() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(extract_text(response), Err(ModelError::EmptyResponse)));
    }
}
