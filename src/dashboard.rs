use chrono::Utc;
use tracing::{info, warn};

use crate::auth::{GoogleOAuth, UserProfile};
use crate::error::AdlensError;
use crate::insights::InsightsService;
use crate::report::adsense::{Account, AdsenseClient};
use crate::report::{ReportTotals, SiteMetrics};
use crate::session::{Session, SessionStore};

/// State of the model-generated summary for a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insights {
    Ready(Vec<String>),
    /// Analysis failed; the report itself is still valid.
    Unavailable(String),
    /// Empty report, nothing to analyze.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub account: String,
    pub report: Vec<SiteMetrics>,
    pub totals: ReportTotals,
    pub insights: Insights,
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub profile: Option<UserProfile>,
    pub accounts: Vec<Account>,
}

/// Ties the OAuth exchange, report source, analysis and session cache
/// together. Every state change is written back to the cache.
pub struct Dashboard {
    oauth: Option<GoogleOAuth>,
    adsense: AdsenseClient,
    insights: InsightsService,
    store: SessionStore,
    session: Session,
}

impl Dashboard {
    /// `oauth` is only needed for [`Dashboard::connect`] and for refreshing
    /// an expired access token.
    pub fn new(
        oauth: Option<GoogleOAuth>,
        adsense: AdsenseClient,
        insights: InsightsService,
        store: SessionStore,
    ) -> Self {
        let session = store.load();
        Self {
            oauth,
            adsense,
            insights,
            store,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn connect(&mut self, code: &str) -> Result<Connection, AdlensError> {
        let oauth = self.oauth.as_ref().ok_or_else(|| {
            AdlensError::Config("GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are required to connect".to_owned())
        })?;
        let tokens = oauth.exchange_code(code).await?;
        let accounts = self.adsense.list_accounts(&tokens).await?;
        let profile = tokens.profile();

        info!(accounts = accounts.len(), "adsense connected");
        self.session = Session {
            profile: profile.clone(),
            tokens: Some(tokens),
            accounts: accounts.clone(),
            ..Session::default()
        };
        self.persist();
        Ok(Connection { profile, accounts })
    }

    /// Refresh the account list with the cached tokens.
    pub async fn accounts(&mut self) -> Result<Vec<Account>, AdlensError> {
        self.ensure_fresh_tokens().await?;
        let tokens = self.session.tokens.as_ref().ok_or(AdlensError::NotConnected)?;
        let accounts = self.adsense.list_accounts(tokens).await?;
        self.session.accounts = accounts.clone();
        self.persist();
        Ok(accounts)
    }

    /// Fetch the 30-day report for `account` and analyze it. A failed
    /// analysis leaves the report in place and marks insights unavailable.
    /// A failed fetch leaves the previous selection untouched.
    pub async fn select_account(&mut self, account: &str) -> Result<Analysis, AdlensError> {
        self.ensure_fresh_tokens().await?;
        let tokens = self.session.tokens.as_ref().ok_or(AdlensError::NotConnected)?;
        let report = self.adsense.generate_report(tokens, account).await?;

        self.session.selected_account = Some(account.to_owned());
        self.session.report = report;
        self.session.report_fetched_at = Some(Utc::now());
        self.session.insights.clear();
        self.persist();

        Ok(self.analyze_cached().await)
    }

    /// Re-run analysis over the cached report.
    pub async fn reanalyze(&mut self) -> Result<Analysis, AdlensError> {
        if self.session.selected_account.is_none() {
            return Err(AdlensError::Report("no cached report, select an account first".to_owned()));
        }
        Ok(self.analyze_cached().await)
    }

    /// Cached report and insights without any network call.
    pub fn cached(&self) -> Option<Analysis> {
        let account = self.session.selected_account.clone()?;
        let insights = if self.session.insights.is_empty() {
            Insights::Skipped
        } else {
            Insights::Ready(self.session.insights.clone())
        };
        Some(Analysis {
            account,
            totals: ReportTotals::from_rows(&self.session.report),
            report: self.session.report.clone(),
            insights,
        })
    }

    pub fn logout(&mut self) -> Result<(), AdlensError> {
        self.session = Session::default();
        self.store.clear()
    }

    async fn analyze_cached(&mut self) -> Analysis {
        let report = self.session.report.clone();
        let insights = if report.is_empty() {
            info!("report is empty, skipping analysis");
            Insights::Skipped
        } else {
            match self.insights.analyze(&report).await {
                Ok(insights) => Insights::Ready(insights),
                Err(e) => {
                    warn!(error = %e, "insights unavailable");
                    Insights::Unavailable(e.to_string())
                }
            }
        };

        self.session.insights = match &insights {
            Insights::Ready(list) => list.clone(),
            _ => Vec::new(),
        };
        self.persist();

        Analysis {
            account: self.session.selected_account.clone().unwrap_or_default(),
            totals: ReportTotals::from_rows(&report),
            report,
            insights,
        }
    }

    /// Swap an expired access token for a fresh one before calling AdSense.
    async fn ensure_fresh_tokens(&mut self) -> Result<(), AdlensError> {
        let tokens = self.session.tokens.as_ref().ok_or(AdlensError::NotConnected)?;
        if !tokens.is_expired(Utc::now()) {
            return Ok(());
        }
        let oauth = self.oauth.as_ref().ok_or_else(|| {
            AdlensError::Auth(
                "access token expired; GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are required to refresh it".to_owned(),
            )
        })?;

        let refreshed = oauth.refresh(tokens).await?;
        info!("access token refreshed");
        self.session.tokens = Some(refreshed);
        self.persist();
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.session) {
            warn!(error = %e, "session not cached");
        }
    }
}
