//! API request and response types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::agent::{TickerJob, Timing};

/// Batch envelope posted by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    pub tickers: Vec<TickerEntry>,

    /// URL each ticker's terminal status is posted to.
    pub callback_url: Option<String>,
}

/// One ticker in the envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerEntry {
    pub ticker: String,

    /// Earnings release date, ISO `YYYY-MM-DD`.
    pub report_date: String,

    /// End of the fiscal period the filing covers; the report date
    /// substitutes when absent.
    pub fiscal_period_end: Option<String>,

    pub timing: Timing,
}

impl TickerEntry {
    /// Validate the entry into a job. Refused at the boundary when the
    /// ticker is empty or a date is not ISO-formatted.
    pub fn into_job(self, callback_url: Option<String>) -> Result<TickerJob, String> {
        let ticker = self.ticker.trim().to_uppercase();
        if ticker.is_empty() || ticker.len() > 10 {
            return Err(format!("invalid ticker: '{}'", self.ticker));
        }

        let report_date = NaiveDate::parse_from_str(&self.report_date, "%Y-%m-%d")
            .map_err(|_| format!("invalid report_date '{}', expected YYYY-MM-DD", self.report_date))?;

        let fiscal_period_end = match &self.fiscal_period_end {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| format!("invalid fiscal_period_end '{}', expected YYYY-MM-DD", raw))?,
            ),
            None => None,
        };

        Ok(TickerJob {
            ticker,
            report_date,
            fiscal_period_end,
            timing: self.timing,
            callback_url,
        })
    }
}

/// Acknowledgment returned after fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub message: String,
    pub tickers: Vec<String>,
}

/// Error body for refused requests.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_deserializes() {
        let body = r#"{
            "tickers": [
                {"ticker": "AAPL", "report_date": "2026-01-29", "timing": "afterhours"},
                {"ticker": "zm", "report_date": "2026-02-28",
                 "fiscal_period_end": "2026-01-31", "timing": "afterhours"}
            ],
            "callback_url": "https://example.com/cb"
        }"#;
        let request: ProcessRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.tickers.len(), 2);

        let job = request.tickers[1]
            .clone()
            .into_job(request.callback_url.clone())
            .unwrap();
        assert_eq!(job.ticker, "ZM");
        assert_eq!(job.date_header(), "2026-01-31");
    }

    #[test]
    fn test_malformed_entries_are_refused() {
        let entry = TickerEntry {
            ticker: "  ".to_string(),
            report_date: "2026-01-29".to_string(),
            fiscal_period_end: None,
            timing: Timing::Premarket,
        };
        assert!(entry.into_job(None).is_err());

        let entry = TickerEntry {
            ticker: "AAPL".to_string(),
            report_date: "01/29/2026".to_string(),
            fiscal_period_end: None,
            timing: Timing::Premarket,
        };
        assert!(entry.into_job(None).is_err());

        let entry = TickerEntry {
            ticker: "AAPL".to_string(),
            report_date: "2026-01-29".to_string(),
            fiscal_period_end: Some("Jan 31".to_string()),
            timing: Timing::Premarket,
        };
        assert!(entry.into_job(None).is_err());
    }
}
