use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdlensError {
    #[error("config error: {0}")]
    Config(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("report error: {0}")]
    Report(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("invalid insights payload: {0}")]
    Insights(String),

    #[error("not connected: run `adlens connect <code>` first")]
    NotConnected,

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Terminal outcome of a fallback completion call. Retryable failures never
/// surface here while candidates remain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("no candidate models configured")]
    Configuration,

    #[error("all candidate models exhausted, last was {model}: {detail}")]
    Exhausted { model: String, detail: String },

    #[error("model {model} rejected the request{}: {detail}", status_suffix(.status))]
    Upstream {
        model: String,
        status: Option<u16>,
        detail: String,
    },
}

impl CompletionError {
    /// Whether the same logical call may succeed later ("try again later").
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Exhausted { .. })
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}
