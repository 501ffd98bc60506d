pub mod groq;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged message of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Output-format hint passed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// The model must answer with a single valid JSON object.
    JsonObject,
}

/// Request content shared by every attempt of a logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub response_format: ResponseFormat,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, response_format: ResponseFormat, temperature: f32) -> Self {
        Self { messages, response_format, temperature }
    }
}

/// Failure of a single attempt against one model.
///
/// `status` is the HTTP status when the backend answered; `None` means the
/// request never got a status (connection refused, bad body, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderError {
    pub fn with_status(status: u16, detail: impl Into<String>) -> Self {
        Self { status: Some(status), detail: detail.into() }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self { status: None, detail: detail.into() }
    }

    /// Rate limiting (429) and server-side failures (5xx) are capacity
    /// problems another model may not have. Everything else fails everywhere.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, Some(429) | Some(500..=599))
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {status}: {}", self.detail),
            None => write!(f, "{}", self.detail),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Extension point for LLM inference backends. Injected into
/// `FallbackRequester`, so tests substitute scripted doubles.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Issue one request against `model`. Returns the raw text payload.
    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<String, ProviderError>;
}
