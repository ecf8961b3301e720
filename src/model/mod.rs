//! Generative model access.
//!
//! - `gemini`: REST client for Google's `generateContent` endpoint
//! - `fallback`: tries an ordered list of model identifiers until one answers
//!
//! The provider is reached through the [`ModelClient`] trait so the loop can
//! be exercised without network access.

mod fallback;
mod gemini;
#[cfg(test)]
pub(crate) mod mock;

pub(crate) use fallback::FallbackInvoker;
pub(crate) use gemini::GeminiClient;

use async_trait::async_trait;

/// A single generation call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerationRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    pub temperature: f32,
}

/// Response content as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ModelContent {
    /// One text body.
    Text(String),
    /// Several text parts that belong to the same answer.
    Fragments(Vec<String>),
}

impl ModelContent {
    /// Collapses the content into one string; fragments are joined by newlines.
    pub fn normalize(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Fragments(parts) => parts.join("\n"),
        }
    }
}

/// Trait for model provider clients.
#[async_trait]
pub(crate) trait ModelClient: Send + Sync {
    /// Returns the provider name for display.
    fn name(&self) -> &'static str;

    /// Runs one generation against `model`.
    async fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<ModelContent, ModelError>;
}

/// Broad class of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    /// Rate or budget limit hit.
    QuotaExhausted,
    /// Model is not available in this deployment.
    NotFound,
    /// Transport, auth or malformed response.
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaExhausted => write!(f, "quota-exhausted"),
            Self::NotFound => write!(f, "not-found"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Failure of one model identifier. Never fatal on its own.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ModelError {
    #[error("Quota exceeded for {model}: {message}")]
    QuotaExhausted { model: String, message: String },

    #[error("Model {model} not found: {message}")]
    NotFound { model: String, message: String },

    #[error("Error with {model}: {message}")]
    Other { model: String, message: String },
}

impl ModelError {
    pub fn quota_exhausted(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QuotaExhausted {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn not_found(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn other(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Classifies a provider failure from its HTTP status (if any) and body.
    pub fn classify(model: &str, status: Option<u16>, message: &str) -> Self {
        let upper = message.to_uppercase();
        if status == Some(429) || upper.contains("RESOURCE_EXHAUSTED") {
            Self::quota_exhausted(model, message)
        } else if status == Some(404) || upper.contains("NOT_FOUND") {
            Self::not_found(model, message)
        } else {
            Self::other(model, message)
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::QuotaExhausted { .. } => FailureKind::QuotaExhausted,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Other { .. } => FailureKind::Other,
        }
    }
}
