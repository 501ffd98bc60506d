use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AdlensError;

use super::{CompletionRequest, Message, Provider, ProviderError, ResponseFormat};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Reported for a request that hit the client-side deadline. Treated like a
/// gateway timeout so the next model gets a chance.
const TIMEOUT_STATUS: u16 = 504;

/// Groq chat completions provider (OpenAI-compatible wire format).
pub struct GroqProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for GroqProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GroqProvider {
    /// `timeout` bounds each attempt, not the whole logical call.
    pub fn new(base_url: &str, api_key: SecretString, timeout: Duration) -> Result<Self, AdlensError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdlensError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }
}

// --- wire structs ---

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<FormatBody>,
}

#[derive(Serialize)]
struct FormatBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl Provider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = ChatBody {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: match request.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::JsonObject => Some(FormatBody { kind: "json_object" }),
            },
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(ProviderError::with_status(status.as_u16(), error_detail(&text)));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::transport(format!("malformed completion body: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "{}".to_owned()))
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::with_status(TIMEOUT_STATUS, format!("request timed out: {e}"))
    } else {
        ProviderError::transport(e.to_string())
    }
}

/// Prefer the upstream `error.message`, fall back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| env.error.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}
