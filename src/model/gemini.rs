//! Google Gemini provider
//!
//! Calls the REST endpoint directly:
//! ```text
//! POST {api_base}/{model}:generateContent
//! x-goog-api-key: <key>
//! ```
//!
//! See: https://ai.google.dev/api/generate-content

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, ModelClient, ModelContent, ModelError};
use crate::config::ModelConfig;

/// Gemini REST client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.api_base, model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiContent,
    generation_config: GeminiGenerationConfig,
}

impl GeminiRequest {
    fn from_generation(request: &GenerationRequest) -> Self {
        Self {
            contents: vec![GeminiContent::text(
                Some("user"),
                &request.user_prompt,
            )],
            system_instruction: GeminiContent::text(None, &request.system_instruction),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(String::from),
            parts: vec![GeminiPart {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Turns a successful response body into content, ignoring non-text parts.
fn parse_response(model: &str, body: &str) -> Result<ModelContent, ModelError> {
    let response: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::other(model, format!("Malformed response: {e}")))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::other(model, "Response contained no candidates"))?;

    let mut texts: Vec<String> = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    match texts.len() {
        0 => Err(ModelError::other(model, "Response contained no text parts")),
        1 => Ok(ModelContent::Text(texts.remove(0))),
        _ => Ok(ModelContent::Fragments(texts)),
    }
}

/// Builds a classified error from a non-2xx response.
fn parse_error(model: &str, status: u16, body: &str) -> ModelError {
    let message = match serde_json::from_str::<GeminiErrorBody>(body) {
        Ok(parsed) if parsed.error.status.is_empty() => parsed.error.message,
        Ok(parsed) => format!("{} ({})", parsed.error.message, parsed.error.status),
        Err(_) => body.trim().to_string(),
    };
    ModelError::classify(model, Some(status), &format!("HTTP {status}: {message}"))
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<ModelContent, ModelError> {
        debug!("Calling {} at {}", model, self.api_base);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&GeminiRequest::from_generation(request))
            .send()
            .await
            .map_err(|e| ModelError::other(model, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::other(model, e.to_string()))?;

        if !status.is_success() {
            return Err(parse_error(model, status.as_u16(), &body));
        }

        debug!("Response length: {} bytes", body.len());
        parse_response(model, &body)
    }
}
