//! Mock model client for testing.
//!
//! Returns predetermined responses and records every call so tests can
//! assert on call order and on the prompts the loop produced.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{GenerationRequest, ModelClient, ModelContent, ModelError};

/// A single scripted response.
#[derive(Debug, Clone)]
pub(crate) enum MockResponse {
    /// Return the given text.
    Text(String),
    /// Return the given fragments.
    Fragments(Vec<String>),
    /// Fail with a quota error.
    Quota,
    /// Fail with a not-found error.
    NotFound,
    /// Fail with a generic error carrying the message.
    Error(String),
}

/// A recorded call.
#[derive(Debug, Clone)]
pub(crate) struct MockCall {
    pub model: String,
    pub request: GenerationRequest,
}

/// A mock client that replays responses in order, cycling when exhausted.
#[derive(Debug, Clone)]
pub(crate) struct MockModelClient {
    responses: Arc<Vec<MockResponse>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockModelClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(responses),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::new(vec![MockResponse::Text(text.to_string())])
    }

    pub fn always_fail(message: &str) -> Self {
        Self::new(vec![MockResponse::Error(message.to_string())])
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.model).collect()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<ModelContent, ModelError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(MockCall {
                model: model.to_string(),
                request: request.clone(),
            });
            calls.len() - 1
        };

        match &self.responses[index % self.responses.len()] {
            MockResponse::Text(text) => Ok(ModelContent::Text(text.clone())),
            MockResponse::Fragments(parts) => Ok(ModelContent::Fragments(parts.clone())),
            MockResponse::Quota => Err(ModelError::classify(
                model,
                Some(429),
                "RESOURCE_EXHAUSTED",
            )),
            MockResponse::NotFound => Err(ModelError::classify(model, Some(404), "NOT_FOUND")),
            MockResponse::Error(message) => Err(ModelError::other(model, message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FailureKind;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_instruction: String::new(),
            user_prompt: "p".to_string(),
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let client = MockModelClient::new(vec![
            MockResponse::Text("first".to_string()),
            MockResponse::Quota,
        ]);

        let r1 = client.generate("a", &request()).await.unwrap();
        let r2 = client.generate("b", &request()).await.unwrap_err();
        let r3 = client.generate("c", &request()).await.unwrap();

        assert_eq!(r1, ModelContent::Text("first".to_string()));
        assert_eq!(r2.kind(), FailureKind::QuotaExhausted);
        assert_eq!(r3, ModelContent::Text("first".to_string()));
        assert_eq!(client.models_called(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let client = MockModelClient::always("ok");
        let _ = client.generate("m", &request()).await;
        assert_eq!(client.calls()[0].request.user_prompt, "p");
    }
}
