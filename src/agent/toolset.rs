//! The fixed tool surface published to the chat LLM.
//!
//! Each tool is a JSON-schema contract translated into a component call;
//! every result goes back to the model as a JSON-serialized string.
//! Recoverable failures are structured `{"error": ...}` payloads so the
//! model can adapt; only a failed login escapes as a hard error, which
//! ends the whole ticker run.

use serde_json::{json, Value};

use crate::browser::{BrowserError, Period, StatementType};
use crate::llm::ToolDefinition;
use crate::workbook::{schema, CellWrite, WorkbookError};

use super::context::{AgentContext, NoteCategory};
use super::numeric::parse_fully_written;

/// Tool schemas, in the order they are published.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "analyze_excel",
            "Analyze the structure of the spreadsheet currently being processed. Returns, per \
             sheet: dimensions, the period headers in rows 1 and 2, the row labels in column A, \
             the full value grid, and the list of empty cells.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        ),
        ToolDefinition::function(
            "browse_stockanalysis",
            "Log in if needed, navigate to the requested financial statement page, switch the \
             display to raw (fully written) numbers, and capture a full-page screenshot. The \
             browser session persists across calls. This does NOT return table data; call \
             extract_page_with_vision afterwards to read the screenshot.",
            json!({
                "type": "object",
                "properties": {
                    "statement_type": {
                        "type": "string",
                        "enum": ["income", "balance", "cashflow"],
                        "description": "Type of financial statement"
                    },
                    "period": {
                        "type": "string",
                        "enum": ["annual", "quarterly"],
                        "description": "Annual or quarterly data"
                    },
                    "data_type": {
                        "type": "string",
                        "enum": ["as-reported"],
                        "description": "View of the filing's original line items"
                    }
                },
                "required": ["statement_type", "period", "data_type"]
            }),
        ),
        ToolDefinition::function(
            "extract_page_with_vision",
            "Send the latest page screenshot to the vision model and get the financial table \
             back as markdown: the row-label column plus the three newest data columns, all \
             numbers fully written. Call after browse_stockanalysis.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        ),
        ToolDefinition::function(
            "web_search",
            "Search the web for financial data via an AI search API grounded in live sources. \
             Use sparingly, to validate extracted values or fill gaps. Returns an answer with \
             citations.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Specific financial query, e.g. 'Apple Inc Q4 2025 quarterly revenue net income total assets'"
                    }
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::function(
            "note_finding",
            "Record a finding to your scratchpad: data gathered, empty cells, validation \
             results, decisions, errors. Notes persist across iterations and are summarized \
             into later files' context.",
            json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": ["data_gathered", "empty_cells", "validation", "decision",
                                 "error", "file_skipped", "file_completed"],
                        "description": "Category of the note"
                    },
                    "content": {
                        "type": "string",
                        "description": "The finding or observation to record"
                    }
                },
                "required": ["category", "content"]
            }),
        ),
        ToolDefinition::function(
            "insert_new_period_column",
            "Insert a new leftmost data column (column B) into a sheet of the current \
             spreadsheet for the newest reporting period. Existing data shifts right with its \
             formatting. The date header is set automatically from the fiscal period end; pass \
             the period label (e.g. 'Q4 2025') taken from the leftmost data column of the \
             extracted table. Returns the row map of cells to fill.",
            json!({
                "type": "object",
                "properties": {
                    "sheet_name": {
                        "type": "string",
                        "description": "Name of the sheet to insert into"
                    },
                    "date_header": {
                        "type": "string",
                        "description": "Proposed period end date for B1 (overridden by the system)"
                    },
                    "period_header": {
                        "type": "string",
                        "description": "Period label for B2, e.g. 'Q4 2025'"
                    }
                },
                "required": ["sheet_name", "date_header", "period_header"]
            }),
        ),
        ToolDefinition::function(
            "update_excel_cell",
            "Write one value into an EMPTY cell of the current spreadsheet. Values must be \
             fully written absolute integers (394328000000, never 394.3B). Writing into a \
             non-empty cell is refused.",
            json!({
                "type": "object",
                "properties": {
                    "sheet_name": {
                        "type": "string",
                        "description": "Name of the sheet"
                    },
                    "cell_ref": {
                        "type": "string",
                        "description": "Cell reference like 'B5'"
                    },
                    "value": {
                        "type": ["string", "number"],
                        "description": "The value to set"
                    }
                },
                "required": ["sheet_name", "cell_ref", "value"]
            }),
        ),
        ToolDefinition::function(
            "save_all_files",
            "Signal that you are done updating the current spreadsheet. Saving and uploading \
             happen automatically once processing of the file completes.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        ),
    ]
}

/// Dispatch one tool call against the context.
///
/// `Ok` carries the JSON string handed back to the model, including
/// structured error payloads. `Err` is reserved for failures that must
/// end the ticker run (login failure).
pub async fn dispatch(
    ctx: &mut AgentContext,
    tool_name: &str,
    args: Value,
) -> anyhow::Result<String> {
    match tool_name {
        "analyze_excel" => Ok(analyze_excel(ctx)),
        "browse_stockanalysis" => browse(ctx, args).await,
        "extract_page_with_vision" => Ok(extract_with_vision(ctx).await),
        "web_search" => Ok(web_search(ctx, args).await),
        "note_finding" => Ok(note_finding(ctx, args)),
        "insert_new_period_column" => Ok(insert_period_column(ctx, args)),
        "update_excel_cell" => Ok(update_cell(ctx, args)),
        "save_all_files" => Ok(json!({
            "acknowledged": true,
            "message": "Files are saved and uploaded automatically after processing completes."
        })
        .to_string()),
        other => Ok(json!({ "error": format!("Unknown tool: {}", other) }).to_string()),
    }
}

fn analyze_excel(ctx: &mut AgentContext) -> String {
    let workbook = match ctx.current_workbook() {
        Ok(w) => w,
        Err(e) => return error_payload(e.to_string()),
    };
    match schema::analyze(workbook) {
        Ok(sheets) => serde_json::to_string_pretty(&sheets)
            .unwrap_or_else(|e| error_payload(format!("serialization failed: {}", e))),
        Err(e) => error_payload(e.to_string()),
    }
}

async fn browse(ctx: &mut AgentContext, args: Value) -> anyhow::Result<String> {
    let statement = match args["statement_type"].as_str() {
        Some("income") => StatementType::Income,
        Some("balance") => StatementType::Balance,
        Some("cashflow") => StatementType::Cashflow,
        _ => return Ok(error_payload("invalid or missing 'statement_type'".to_string())),
    };
    let period = match args["period"].as_str() {
        Some("annual") => Period::Annual,
        Some("quarterly") => Period::Quarterly,
        _ => return Ok(error_payload("invalid or missing 'period'".to_string())),
    };
    if args["data_type"].as_str() != Some("as-reported") {
        return Ok(error_payload("'data_type' must be 'as-reported'".to_string()));
    }

    let ticker = ctx.job.ticker.clone();
    let browser = match ctx.browser().await {
        Ok(b) => b,
        Err(e @ BrowserError::Launch(_)) => return Err(e.into()),
        Err(e) => return Ok(error_payload(e.to_string())),
    };

    match browser.navigate_to_financials(&ticker, statement, period).await {
        Ok(url) => {
            let source = format!(
                "stockanalysis.com/{}/{}/as-reported",
                args["statement_type"].as_str().unwrap_or_default(),
                args["period"].as_str().unwrap_or_default()
            );
            ctx.record_source(source);
            Ok(json!({
                "success": true,
                "url": url,
                "screenshot_available": true,
                "message": "Screenshot captured. Use extract_page_with_vision to read the financial data."
            })
            .to_string())
        }
        // A failed login cannot be recovered by the model; end the run.
        Err(e @ BrowserError::LoginFailed) => Err(e.into()),
        Err(e) => Ok(error_payload(e.to_string())),
    }
}

async fn extract_with_vision(ctx: &mut AgentContext) -> String {
    let screenshot = match ctx.latest_screenshot() {
        Some(bytes) => bytes.to_vec(),
        None => {
            return error_payload(
                "No screenshot available. Call browse_stockanalysis first.".to_string(),
            )
        }
    };

    match ctx.vision.extract_table(&screenshot).await {
        Ok(markdown) => {
            ctx.record_source("gemini-vision");
            json!({ "success": true, "extracted_data": markdown }).to_string()
        }
        Err(e) => error_payload(format!("Vision extraction failed: {}", e)),
    }
}

async fn web_search(ctx: &mut AgentContext, args: Value) -> String {
    let query = match args["query"].as_str() {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return error_payload("missing 'query' argument".to_string()),
    };

    match ctx.search.search(&query).await {
        Ok(answer) => {
            ctx.record_source("perplexity-web-search");
            json!({ "answer": answer.answer, "citations": answer.citations }).to_string()
        }
        Err(e) => error_payload(format!("Web search failed: {}", e)),
    }
}

fn note_finding(ctx: &mut AgentContext, args: Value) -> String {
    let category = match args["category"].as_str().and_then(NoteCategory::parse) {
        Some(c) => c,
        None => return error_payload("invalid or missing 'category'".to_string()),
    };
    let content = match args["content"].as_str() {
        Some(c) => c.to_string(),
        None => return error_payload("missing 'content' argument".to_string()),
    };

    ctx.add_note(category, content);
    json!({ "recorded": true, "total_notes": ctx.notes.len() }).to_string()
}

fn insert_period_column(ctx: &mut AgentContext, args: Value) -> String {
    let sheet = match args["sheet_name"].as_str() {
        Some(s) => s.to_string(),
        None => return error_payload("missing 'sheet_name' argument".to_string()),
    };
    let period_header = match args["period_header"].as_str() {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => return error_payload("missing 'period_header' argument".to_string()),
    };

    // The agent's date_header proposal is ignored: the fiscal period end
    // (else the report date) is the authoritative column header.
    let date_header = ctx.job.date_header();

    let current_is_annual = ctx
        .current_bucket
        .as_deref()
        .map(|b| b.contains("annual"))
        .unwrap_or(false);

    let workbook = match ctx.current_workbook() {
        Ok(w) => w,
        Err(e) => return error_payload(e.to_string()),
    };

    match workbook.insert_period_column(&sheet, &date_header, &period_header) {
        Ok(row_map) => {
            if !current_is_annual && ctx.detected_quarter.is_none() {
                ctx.detected_quarter = Some(period_header.clone());
            }
            json!({
                "success": true,
                "date_header": date_header,
                "period_header": period_header,
                "row_map": row_map,
                "message": "New column B inserted. Fill the row_map cells with fully written integers; leave unknown values blank."
            })
            .to_string()
        }
        Err(e) => error_payload(e.to_string()),
    }
}

fn update_cell(ctx: &mut AgentContext, args: Value) -> String {
    let sheet = match args["sheet_name"].as_str() {
        Some(s) => s.to_string(),
        None => return error_payload("missing 'sheet_name' argument".to_string()),
    };
    let cell_ref = match args["cell_ref"].as_str() {
        Some(c) => c.to_string(),
        None => return error_payload("missing 'cell_ref' argument".to_string()),
    };

    let number = match parse_fully_written(&args["value"]) {
        Ok(n) => n,
        Err(message) => return error_payload(message),
    };

    let workbook = match ctx.current_workbook() {
        Ok(w) => w,
        Err(e) => return error_payload(e.to_string()),
    };

    match workbook.update_cell(&sheet, &cell_ref, CellWrite::Number(number)) {
        Ok(()) => {
            ctx.record_cell_written();
            json!({ "success": true, "cell_ref": cell_ref }).to_string()
        }
        Err(e @ WorkbookError::CellConflict { .. }) => error_payload(format!(
            "{}; existing data is never overwritten, choose a different target",
            e
        )),
        Err(e) => error_payload(e.to_string()),
    }
}

fn error_payload(message: String) -> String {
    json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_cover_the_tool_surface() {
        let names: Vec<String> = definitions()
            .iter()
            .map(|d| d.function.name.clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "analyze_excel",
                "browse_stockanalysis",
                "extract_page_with_vision",
                "web_search",
                "note_finding",
                "insert_new_period_column",
                "update_excel_cell",
                "save_all_files",
            ]
        );
    }

    #[test]
    fn test_browse_data_type_is_as_reported_only() {
        let defs = definitions();
        let browse = defs
            .iter()
            .find(|d| d.function.name == "browse_stockanalysis")
            .unwrap();
        let data_type_enum = &browse.function.parameters["properties"]["data_type"]["enum"];
        assert_eq!(data_type_enum, &json!(["as-reported"]));
    }
}
