use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CompletionError;
use crate::providers::{CompletionRequest, Provider, ProviderError};

/// Ordered backend identifiers. Priority is list order. No mutating API, so
/// the list cannot change while a logical call walks it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateList(Vec<String>);

impl CandidateList {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(models.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Classification of one attempt.
enum AttemptOutcome {
    Success(String),
    RetryableFailure(ProviderError),
    FatalFailure(ProviderError),
}

impl From<Result<String, ProviderError>> for AttemptOutcome {
    fn from(result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(payload) => AttemptOutcome::Success(payload),
            Err(e) if e.is_retryable() => AttemptOutcome::RetryableFailure(e),
            Err(e) => AttemptOutcome::FatalFailure(e),
        }
    }
}

/// Runs a completion against a prioritized list of models, moving to the next
/// model only on rate limiting or server errors.
///
/// Holds no per-call state, so one requester serves concurrent calls.
/// Dropping the future returned by [`FallbackRequester::complete`] stops the
/// chain: no attempt starts after the drop.
#[derive(Clone)]
pub struct FallbackRequester {
    provider: Arc<dyn Provider>,
}

impl std::fmt::Debug for FallbackRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRequester")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl FallbackRequester {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Each candidate is tried at most once, in order, with the same request.
    /// The models tried always form a prefix of `candidates`.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        candidates: &CandidateList,
    ) -> Result<String, CompletionError> {
        let models = candidates.as_slice();
        if models.is_empty() {
            return Err(CompletionError::Configuration);
        }

        let mut index = 0;
        loop {
            let model = &models[index];
            debug!(provider = self.provider.name(), model = %model, attempt = index + 1, "requesting completion");

            match AttemptOutcome::from(self.provider.complete(model, request).await) {
                AttemptOutcome::Success(payload) => return Ok(payload),
                AttemptOutcome::FatalFailure(e) => {
                    return Err(CompletionError::Upstream {
                        model: model.clone(),
                        status: e.status,
                        detail: e.detail,
                    });
                }
                AttemptOutcome::RetryableFailure(e) => match models.get(index + 1) {
                    Some(next) => {
                        warn!(failed = %model, next = %next, error = %e, "model failed, switching");
                        index += 1;
                    }
                    None => {
                        return Err(CompletionError::Exhausted {
                            model: model.clone(),
                            detail: e.detail,
                        });
                    }
                },
            }
        }
    }
}
