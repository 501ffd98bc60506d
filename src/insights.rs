use serde::Deserialize;
use tracing::info;

use crate::error::AdlensError;
use crate::fallback::{CandidateList, FallbackRequester};
use crate::providers::{CompletionRequest, Message, ResponseFormat};
use crate::report::SiteMetrics;

pub const INSIGHT_COUNT: usize = 3;

const OBJECTIVES: &str = "\
OBJECTIVES:
1. Revenue leakage: identify sites with high traffic (page views) but low RPM.
2. CTR anomalies: flag sites with suspiciously high CTR (above 10%) or very low CTR (below 0.5%).
3. Actionable advice: give one specific optimization tip.

OUTPUT REQUIREMENTS:
- Provide exactly 3 clear, professional insights.
- Return strictly valid JSON with a single key \"insights\" containing an array of 3 strings.";

/// Analysis request over the first `max_rows` rows (the report is ordered by
/// earnings, so these are the top earners).
pub fn build_request(rows: &[SiteMetrics], max_rows: usize, temperature: f32) -> Result<CompletionRequest, AdlensError> {
    let top = &rows[..rows.len().min(max_rows)];
    let data = serde_json::to_string(top)
        .map_err(|e| AdlensError::Insights(format!("cannot encode report rows: {e}")))?;

    let prompt = format!(
        "You are a monetization expert. Analyze this Google AdSense data for the last 30 days.\n\n\
         DATA INPUT (top sites):\n{data}\n\n{OBJECTIVES}"
    );
    Ok(CompletionRequest::new(
        vec![Message::user(prompt)],
        ResponseFormat::JsonObject,
        temperature,
    ))
}

#[derive(Deserialize)]
struct InsightsPayload {
    insights: Vec<serde_json::Value>,
}

/// Extract up to three non-empty insight strings from the model's JSON.
pub fn parse_insights(payload: &str) -> Result<Vec<String>, AdlensError> {
    let parsed: InsightsPayload = serde_json::from_str(payload)
        .map_err(|e| AdlensError::Insights(format!("expected {{\"insights\": [...]}}: {e}")))?;

    let insights: Vec<String> = parsed
        .insights
        .into_iter()
        .filter_map(|v| v.as_str().map(str::trim).map(str::to_owned))
        .filter(|s| !s.is_empty())
        .take(INSIGHT_COUNT)
        .collect();

    if insights.is_empty() {
        return Err(AdlensError::Insights("model returned no insights".to_owned()));
    }
    Ok(insights)
}

#[derive(Debug, Clone)]
enum Backend {
    Models {
        requester: FallbackRequester,
        candidates: CandidateList,
    },
    /// No model backend configured; every analysis fails with this reason.
    Missing(String),
}

/// Report analysis through the model fallback chain.
#[derive(Debug, Clone)]
pub struct InsightsService {
    backend: Backend,
    max_rows: usize,
    temperature: f32,
}

impl InsightsService {
    pub fn new(requester: FallbackRequester, candidates: CandidateList, max_rows: usize, temperature: f32) -> Self {
        Self {
            backend: Backend::Models { requester, candidates },
            max_rows,
            temperature,
        }
    }

    /// A service without a model backend. Reports still load; analysis
    /// reports `reason` as a configuration error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: Backend::Missing(reason.into()),
            max_rows: 0,
            temperature: 0.0,
        }
    }

    pub async fn analyze(&self, rows: &[SiteMetrics]) -> Result<Vec<String>, AdlensError> {
        let (requester, candidates) = match &self.backend {
            Backend::Models { requester, candidates } => (requester, candidates),
            Backend::Missing(reason) => return Err(AdlensError::Config(reason.clone())),
        };
        let request = build_request(rows, self.max_rows, self.temperature)?;
        let payload = requester.complete(&request, candidates).await?;
        let insights = parse_insights(&payload)?;
        info!(count = insights.len(), "insights generated");
        Ok(insights)
    }
}
