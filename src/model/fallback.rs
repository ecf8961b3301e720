//! Ordered model fallback.
//!
//! Each configured model gets exactly one call. Failures of any class move
//! on to the next identifier after a fixed pause; only running out of
//! identifiers is reported to the caller.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{FailureKind, GenerationRequest, ModelClient, ModelError};
use crate::config::ModelConfig;

/// Sampling temperature for every call; generation should be repeatable.
const DETERMINISTIC_TEMPERATURE: f32 = 0.0;

/// The winning model and its normalized answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModelInvocation {
    pub model: String,
    pub content: String,
}

/// Terminal failure of a fallback sweep.
#[derive(Debug, thiserror::Error)]
pub(crate) enum FallbackError {
    #[error("All AI models failed ({tried} tried). Last error: {last}")]
    AllModelsExhausted { tried: usize, last: String },
}

impl FallbackError {
    fn exhausted(tried: usize, last: Option<ModelError>) -> Self {
        Self::AllModelsExhausted {
            tried,
            last: last.map_or_else(|| "no models configured".to_string(), |e| e.to_string()),
        }
    }
}

/// Tries model identifiers in priority order until one responds.
pub(crate) struct FallbackInvoker {
    client: Arc<dyn ModelClient>,
    models: Vec<String>,
    pause: Duration,
}

impl FallbackInvoker {
    pub fn new(client: Arc<dyn ModelClient>, config: &ModelConfig) -> Self {
        Self {
            client,
            models: config.models.clone(),
            pause: config.retry_pause(),
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn provider(&self) -> &'static str {
        self.client.name()
    }

    /// Sends the prompt to each model in turn and returns the first answer.
    pub async fn invoke(
        &self,
        system_instruction: &str,
        user_prompt: &str,
    ) -> Result<ModelInvocation, FallbackError> {
        let request = GenerationRequest {
            system_instruction: system_instruction.to_string(),
            user_prompt: user_prompt.to_string(),
            temperature: DETERMINISTIC_TEMPERATURE,
        };

        let mut last_error = None;

        for (index, model) in self.models.iter().enumerate() {
            info!(event = "model_attempt", model = %model, "Attempting model {}", model);

            match self.client.generate(model, &request).await {
                Ok(content) => {
                    info!(event = "model_success", model = %model, "Success with {}", model);
                    return Ok(ModelInvocation {
                        model: model.clone(),
                        content: content.normalize(),
                    });
                }
                Err(e) => {
                    match e.kind() {
                        FailureKind::QuotaExhausted => {
                            warn!(event = "model_failure", model = %model, kind = %e.kind(), "Quota exceeded for {}. Switching...", model);
                        }
                        FailureKind::NotFound => {
                            warn!(event = "model_failure", model = %model, kind = %e.kind(), "Model {} not found. Switching...", model);
                        }
                        FailureKind::Other => {
                            warn!(event = "model_failure", model = %model, kind = %e.kind(), "{}", e);
                        }
                    }
                    last_error = Some(e);

                    // No point pausing after the final identifier
                    if index + 1 < self.models.len() && !self.pause.is_zero() {
                        tokio::time::sleep(self.pause).await;
                    }
                }
            }
        }

        Err(FallbackError::exhausted(self.models.len(), last_error))
    }
}
