use serde::Deserialize;
use tracing::debug;

use crate::auth::TokenBundle;
use crate::error::AdlensError;

use super::SiteMetrics;

pub const DEFAULT_API_BASE_URL: &str = "https://adsense.googleapis.com/v2";

const DIMENSION: &str = "DOMAIN_NAME";
const EARNINGS: &str = "ESTIMATED_EARNINGS";
const PAGE_VIEWS: &str = "PAGE_VIEWS";
const IMPRESSIONS: &str = "IMPRESSIONS";
const CLICKS: &str = "CLICKS";
const PAGE_VIEWS_RPM: &str = "PAGE_VIEWS_RPM";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Resource name, e.g. `accounts/pub-1234567890`.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// --- wire structs ---

#[derive(Deserialize)]
struct AccountsPage {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct ReportResult {
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct Header {
    name: String,
}

#[derive(Deserialize)]
struct Row {
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    #[serde(default)]
    value: String,
}

/// Column positions resolved from the report headers.
struct Columns {
    site: usize,
    earnings: usize,
    page_views: usize,
    impressions: usize,
    clicks: usize,
    rpm: Option<usize>,
}

impl Columns {
    fn resolve(headers: &[Header]) -> Result<Self, AdlensError> {
        let find = |name: &str| headers.iter().position(|h| h.name == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| AdlensError::Report(format!("report is missing column {name}")))
        };
        Ok(Self {
            site: require(DIMENSION)?,
            earnings: require(EARNINGS)?,
            page_views: require(PAGE_VIEWS)?,
            impressions: require(IMPRESSIONS)?,
            clicks: require(CLICKS)?,
            rpm: find(PAGE_VIEWS_RPM),
        })
    }
}

/// Read-only AdSense Management API v2 client.
#[derive(Debug, Clone)]
pub struct AdsenseClient {
    http: reqwest::Client,
    base_url: String,
}

impl AdsenseClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub async fn list_accounts(&self, tokens: &TokenBundle) -> Result<Vec<Account>, AdlensError> {
        let page: AccountsPage = self
            .get_json(format!("{}/accounts", self.base_url), tokens, &[])
            .await?;
        Ok(page.accounts)
    }

    /// Per-site report for the last 30 days, highest earnings first.
    pub async fn generate_report(
        &self,
        tokens: &TokenBundle,
        account: &str,
    ) -> Result<Vec<SiteMetrics>, AdlensError> {
        if !account.starts_with("accounts/") {
            return Err(AdlensError::Report(format!(
                "account must be a resource name like accounts/pub-123, got {account:?}"
            )));
        }

        let query = [
            ("dateRange", "LAST_30_DAYS"),
            ("dimensions", DIMENSION),
            ("metrics", EARNINGS),
            ("metrics", PAGE_VIEWS),
            ("metrics", IMPRESSIONS),
            ("metrics", CLICKS),
            ("metrics", PAGE_VIEWS_RPM),
            ("orderBy", "-ESTIMATED_EARNINGS"),
        ];
        let result: ReportResult = self
            .get_json(format!("{}/{account}/reports:generate", self.base_url), tokens, &query)
            .await?;

        let rows = parse_rows(result)?;
        debug!(account, rows = rows.len(), "report generated");
        Ok(rows)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        tokens: &TokenBundle,
        query: &[(&str, &str)],
    ) -> Result<T, AdlensError> {
        let response = self
            .http
            .get(&url)
            .bearer_auth(tokens.bearer())
            .query(query)
            .send()
            .await
            .map_err(|e| AdlensError::Report(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdlensError::Report(format!("{url} returned status {status}: {}", body.trim())));
        }

        response
            .json()
            .await
            .map_err(|e| AdlensError::Report(format!("malformed response from {url}: {e}")))
    }
}

fn parse_rows(result: ReportResult) -> Result<Vec<SiteMetrics>, AdlensError> {
    if result.rows.is_empty() {
        return Ok(Vec::new());
    }
    let columns = Columns::resolve(&result.headers)?;

    result
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let reported_rpm = match columns.rpm {
                Some(idx) => Some(parse_cell::<f64>(row, i, idx)?),
                None => None,
            };
            Ok(SiteMetrics::new(
                cell(row, i, columns.site)?,
                parse_cell::<f64>(row, i, columns.earnings)?,
                parse_cell::<u64>(row, i, columns.page_views)?,
                parse_cell::<u64>(row, i, columns.impressions)?,
                parse_cell::<u64>(row, i, columns.clicks)?,
                reported_rpm,
            ))
        })
        .collect()
}

fn cell(row: &Row, row_index: usize, idx: usize) -> Result<&str, AdlensError> {
    row.cells
        .get(idx)
        .map(|c| c.value.trim())
        .ok_or_else(|| AdlensError::Report(format!("row {row_index} has no cell {idx}")))
}

fn parse_cell<T>(row: &Row, row_index: usize, idx: usize) -> Result<T, AdlensError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = cell(row, row_index, idx)?;
    raw.parse::<T>()
        .map_err(|e| AdlensError::Report(format!("row {row_index}: bad value {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(json: serde_json::Value) -> ReportResult {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn columns_are_located_by_header() {
        let result = report(serde_json::json!({
            "headers": [
                {"name": "CLICKS", "type": "METRIC_TALLY"},
                {"name": "DOMAIN_NAME", "type": "DIMENSION"},
                {"name": "IMPRESSIONS", "type": "METRIC_TALLY"},
                {"name": "ESTIMATED_EARNINGS", "type": "METRIC_CURRENCY", "currencyCode": "USD"},
                {"name": "PAGE_VIEWS", "type": "METRIC_TALLY"}
            ],
            "rows": [{"cells": [
                {"value": "25"}, {"value": "example.com"}, {"value": "5000"},
                {"value": "12.50"}, {"value": "1000"}
            ]}]
        }));
        let rows = parse_rows(result).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].site, "example.com");
        assert_eq!(rows[0].clicks, 25);
        assert!((rows[0].rpm - 12.5).abs() < 1e-9);
        assert!((rows[0].ctr - 0.005).abs() < 1e-9);
    }

    #[test]
    fn no_rows_is_empty_report() {
        let result = report(serde_json::json!({"headers": [], "totalMatchedRows": "0"}));
        assert!(parse_rows(result).unwrap().is_empty());
    }

    #[test]
    fn missing_column_is_rejected() {
        let result = report(serde_json::json!({
            "headers": [{"name": "DOMAIN_NAME"}],
            "rows": [{"cells": [{"value": "example.com"}]}]
        }));
        let err = parse_rows(result).unwrap_err();
        assert!(matches!(err, AdlensError::Report(msg) if msg.contains("ESTIMATED_EARNINGS")));
    }

    #[test]
    fn bad_number_is_rejected() {
        let result = report(serde_json::json!({
            "headers": [
                {"name": "DOMAIN_NAME"}, {"name": "ESTIMATED_EARNINGS"}, {"name": "PAGE_VIEWS"},
                {"name": "IMPRESSIONS"}, {"name": "CLICKS"}
            ],
            "rows": [{"cells": [
                {"value": "example.com"}, {"value": "n/a"}, {"value": "1"},
                {"value": "1"}, {"value": "1"}
            ]}]
        }));
        assert!(matches!(parse_rows(result), Err(AdlensError::Report(_))));
    }
}
