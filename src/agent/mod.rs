//! Per-ticker agent: context, tool surface, prompts, and the orchestrated
//! tool-calling loop that updates the statement spreadsheets.
//!
//! One ticker run processes the six target files in a fixed order,
//! quarterly statements first. The first quarterly column insertion
//! establishes the reporting quarter; annual files are only processed
//! when that quarter is a fourth quarter, since annual statements roll
//! forward once per year.

mod callback;
mod context;
mod numeric;
mod orchestrator;
mod prompts;
mod toolset;

pub use callback::{send_callback, CallbackPayload};
pub use context::{AgentContext, Note, NoteCategory};
pub use orchestrator::{process_ticker, process_ticker_with, RunStatus, TickerOutcome};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::browser::{Period, StatementType};

/// When the earnings release happened relative to market hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    Premarket,
    Afterhours,
}

/// One unit of work: a ticker with its earnings-release coordinates.
///
/// The `(ticker, report_date, timing)` triple is the external identity of
/// the job and is echoed verbatim in the terminal callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerJob {
    pub ticker: String,
    pub report_date: NaiveDate,
    pub fiscal_period_end: Option<NaiveDate>,
    pub timing: Timing,
    pub callback_url: Option<String>,
}

impl TickerJob {
    /// The authoritative date header for a newly inserted column:
    /// the fiscal period end, falling back to the report date.
    pub fn date_header(&self) -> String {
        self.fiscal_period_end
            .unwrap_or(self.report_date)
            .format("%Y-%m-%d")
            .to_string()
    }
}

/// One of the six spreadsheets a ticker run targets.
#[derive(Debug, Clone, Copy)]
pub struct TargetFile {
    pub bucket: &'static str,
    pub statement: StatementType,
    pub period: Period,
}

impl TargetFile {
    pub fn is_annual(&self) -> bool {
        self.period == Period::Annual
    }
}

/// Processing order: quarterly statements first, so the detected quarter
/// is known before any annual file is considered.
pub const FILE_ORDER: [TargetFile; 6] = [
    TargetFile {
        bucket: "financials-quarterly-income",
        statement: StatementType::Income,
        period: Period::Quarterly,
    },
    TargetFile {
        bucket: "financials-quarterly-balance",
        statement: StatementType::Balance,
        period: Period::Quarterly,
    },
    TargetFile {
        bucket: "financials-quarterly-cashflow",
        statement: StatementType::Cashflow,
        period: Period::Quarterly,
    },
    TargetFile {
        bucket: "financials-annual-income",
        statement: StatementType::Income,
        period: Period::Annual,
    },
    TargetFile {
        bucket: "financials-annual-balance",
        statement: StatementType::Balance,
        period: Period::Annual,
    },
    TargetFile {
        bucket: "financials-annual-cashflow",
        statement: StatementType::Cashflow,
        period: Period::Annual,
    },
];

/// Whether a period label indicates a fourth-quarter report.
pub fn is_fourth_quarter(period_header: &str) -> bool {
    period_header.to_lowercase().contains("q4")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_order_is_quarterly_first() {
        assert!(FILE_ORDER[..3].iter().all(|f| !f.is_annual()));
        assert!(FILE_ORDER[3..].iter().all(|f| f.is_annual()));
    }

    #[test]
    fn test_fourth_quarter_detection() {
        assert!(is_fourth_quarter("Q4 2025"));
        assert!(is_fourth_quarter("q4 2026"));
        assert!(is_fourth_quarter("FY Q4"));
        assert!(!is_fourth_quarter("Q1 2026"));
        assert!(!is_fourth_quarter("Q3 2026"));
    }

    #[test]
    fn test_date_header_prefers_fiscal_period_end() {
        let job = TickerJob {
            ticker: "ZM".to_string(),
            report_date: NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
            fiscal_period_end: Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
            timing: Timing::Afterhours,
            callback_url: None,
        };
        assert_eq!(job.date_header(), "2026-01-31");

        let job = TickerJob {
            fiscal_period_end: None,
            ..job
        };
        assert_eq!(job.date_header(), "2026-02-28");
    }
}
