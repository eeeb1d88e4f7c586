//! Prompt construction for the per-file tool loop.

use crate::browser::Period;
use crate::workbook::schema::SheetStructure;

use super::{TargetFile, TickerJob};

/// System prompt for one target file: identity, browse parameters,
/// workflow rules, and the scratchpad carried over from earlier files.
pub fn system_prompt(
    job: &TickerJob,
    file: &TargetFile,
    max_iterations: usize,
    note_summary: &str,
) -> String {
    let period = match file.period {
        Period::Annual => "annual",
        Period::Quarterly => "quarterly",
    };
    let statement = file.bucket.rsplit('-').next().unwrap_or("income");

    format!(
        r#"You are a financial data agent. You update one Excel file containing financial statements with the company's newest reported period.

CURRENT FILE: {bucket}
TICKER: {ticker}
EARNINGS REPORT DATE: {report_date}
FISCAL PERIOD END: {fiscal_period_end}

BROWSE PARAMETERS for this file (use exactly these):
- statement_type: "{statement}"
- period: "{period}"
- data_type: "as-reported"

WORKFLOW:
1. Use analyze_excel to inspect the file structure.
2. Use browse_stockanalysis with the parameters above, then extract_page_with_vision to read the table from the screenshot.
3. If the file does not yet have a column for the newest reporting period, call insert_new_period_column. Take the period_header from the leftmost data column of the extracted table (e.g. "Q4 2025"). The date header is set automatically.
4. Fill the new column's cells (and any other empty cells you were asked about) with update_excel_cell, matching row labels carefully against the extracted table.
5. Use web_search only to validate values you are unsure about or to fill gaps.
6. Use note_finding to record gathered data, validation results, and decisions.
7. Call save_all_files when the file is complete, then stop.

CRITICAL RULES:
- NEVER modify cells that already contain values. Only fill empty cells or cells in a newly inserted column. Conflicting writes are refused.
- Every numeric value must be a fully written absolute integer (e.g. 394328000000, never 394.33B or 394.3).
- If you cannot confidently match a row label to the extracted table, leave the cell blank.
- The vision-extracted table is the primary source; web_search is for validation only.
- You have at most {max_iterations} tool iterations for this file. Work efficiently.

NOTES FROM EARLIER FILES:
{note_summary}"#,
        bucket = file.bucket,
        ticker = job.ticker,
        report_date = job.report_date.format("%Y-%m-%d"),
        fiscal_period_end = job.date_header(),
        statement = statement,
        period = period,
        max_iterations = max_iterations,
        note_summary = note_summary,
    )
}

/// First user message: the full grid plus the empty-cell situation.
///
/// When a new column is about to be inserted, the empty-cell reminder is
/// restricted to column B and historical gaps are explicitly waived.
pub fn first_user_message(
    job: &TickerJob,
    file: &TargetFile,
    sheets: &[SheetStructure],
    insert_pending: bool,
) -> String {
    let mut body = format!(
        "Process {bucket} for ticker {ticker}.\n\nCurrent contents:\n\n",
        bucket = file.bucket,
        ticker = job.ticker,
    );

    for sheet in sheets {
        body.push_str(&sheet.format_for_prompt(insert_pending));
        body.push('\n');
    }

    if insert_pending {
        body.push_str(&format!(
            "The leftmost data column does not cover the period ending {date}. Insert a new \
             period column and fill ONLY its cells (column B). Ignore empty cells in older \
             columns; they are historical gaps and must stay as they are.\n",
            date = job.date_header(),
        ));
    } else {
        body.push_str(
            "The newest period column already exists. Fill only the empty cells listed above \
             with verified values; leave anything you cannot verify blank.\n",
        );
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Timing, FILE_ORDER};
    use chrono::NaiveDate;

    fn job() -> TickerJob {
        TickerJob {
            ticker: "ZM".to_string(),
            report_date: NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
            fiscal_period_end: Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
            timing: Timing::Afterhours,
            callback_url: None,
        }
    }

    #[test]
    fn test_system_prompt_carries_browse_parameters() {
        let prompt = system_prompt(&job(), &FILE_ORDER[1], 15, "(no notes yet)");
        assert!(prompt.contains("financials-quarterly-balance"));
        assert!(prompt.contains(r#"statement_type: "balance""#));
        assert!(prompt.contains(r#"period: "quarterly""#));
        assert!(prompt.contains("2026-01-31"));
    }

    #[test]
    fn test_user_message_restricts_to_column_b_when_inserting() {
        let message = first_user_message(&job(), &FILE_ORDER[0], &[], true);
        assert!(message.contains("column B"));
        assert!(message.contains("Ignore empty cells in older"));
    }
}
