pub mod adsense;

use serde::{Deserialize, Serialize};

/// Earnings per thousand page views. Zero page views yields 0.
pub fn rpm(earnings: f64, page_views: u64) -> f64 {
    if page_views == 0 {
        0.0
    } else {
        earnings / page_views as f64 * 1000.0
    }
}

/// Clicks per impression. Zero impressions yields 0.
pub fn ctr(clicks: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        0.0
    } else {
        clicks as f64 / impressions as f64
    }
}

/// One report row: a site's 30-day performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteMetrics {
    pub site: String,
    pub earnings: f64,
    pub page_views: u64,
    pub impressions: u64,
    pub clicks: u64,
    pub rpm: f64,
    pub ctr: f64,
}

impl SiteMetrics {
    /// Build a row, deriving RPM when the source did not report it. CTR is
    /// always derived.
    pub fn new(
        site: impl Into<String>,
        earnings: f64,
        page_views: u64,
        impressions: u64,
        clicks: u64,
        reported_rpm: Option<f64>,
    ) -> Self {
        Self {
            site: site.into(),
            earnings,
            page_views,
            impressions,
            clicks,
            rpm: reported_rpm.unwrap_or_else(|| rpm(earnings, page_views)),
            ctr: ctr(clicks, impressions),
        }
    }
}

/// Account-wide sums with RPM and CTR derived from the sums, not averaged.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTotals {
    pub earnings: f64,
    pub page_views: u64,
    pub impressions: u64,
    pub clicks: u64,
    pub rpm: f64,
    pub ctr: f64,
}

impl ReportTotals {
    pub fn from_rows(rows: &[SiteMetrics]) -> Self {
        let mut totals = rows.iter().fold(Self::default(), |mut acc, row| {
            acc.earnings += row.earnings;
            acc.page_views += row.page_views;
            acc.impressions += row.impressions;
            acc.clicks += row.clicks;
            acc
        });
        totals.rpm = rpm(totals.earnings, totals.page_views);
        totals.ctr = ctr(totals.clicks, totals.impressions);
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn derives_rpm_and_ctr() {
        let row = SiteMetrics::new("example.com", 12.50, 1000, 5000, 25, None);
        assert!(close(row.rpm, 12.50));
        assert!(close(row.ctr, 0.005));
    }

    #[test]
    fn zero_page_views_yields_zero_rpm() {
        let row = SiteMetrics::new("example.com", 3.0, 0, 100, 1, None);
        assert_eq!(row.rpm, 0.0);
    }

    #[test]
    fn zero_impressions_yields_zero_ctr() {
        let row = SiteMetrics::new("example.com", 0.0, 10, 0, 0, None);
        assert_eq!(row.ctr, 0.0);
    }

    #[test]
    fn reported_rpm_wins() {
        let row = SiteMetrics::new("example.com", 12.50, 1000, 5000, 25, Some(9.75));
        assert_eq!(row.rpm, 9.75);
    }

    #[test]
    fn totals_derive_from_sums() {
        let rows = vec![
            SiteMetrics::new("a.com", 10.0, 1000, 4000, 20, None),
            SiteMetrics::new("b.com", 2.0, 1000, 1000, 30, None),
        ];
        let totals = ReportTotals::from_rows(&rows);
        assert!(close(totals.earnings, 12.0));
        assert_eq!(totals.page_views, 2000);
        assert!(close(totals.rpm, 6.0));
        assert!(close(totals.ctr, 0.01));
    }

    #[test]
    fn empty_report_totals_are_zero() {
        assert_eq!(ReportTotals::from_rows(&[]), ReportTotals::default());
    }

    #[test]
    fn serializes_camel_case() {
        let row = SiteMetrics::new("example.com", 1.0, 2, 3, 0, None);
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("pageViews").is_some());
        assert!(json.get("page_views").is_none());
    }
}
