//! Per-ticker control flow.
//!
//! Downloads the six target spreadsheets, walks them in the fixed order,
//! runs the bounded tool loop per file, gates annual files on the
//! detected quarter, uploads files that actually received cell writes,
//! and delivers the terminal callback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::llm::{
    ChatMessage, ChatOptions, ChatResponse, LlmClient, OpenRouterClient, RetryConfig, Role,
    ToolDefinition,
};
use crate::storage::{StorageClient, StorageError};
use crate::workbook::schema::{self, SheetStructure};

use super::context::{AgentContext, NoteCategory};
use super::{is_fourth_quarter, prompts, toolset, TargetFile, TickerJob, FILE_ORDER};

const LLM_MAX_TOKENS: u64 = 8192;

/// Terminal state of a ticker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Everything the callback needs about a finished run.
#[derive(Debug, Clone)]
pub struct TickerOutcome {
    pub job: TickerJob,
    pub status: RunStatus,
    pub files_updated: u32,
    pub data_sources: Vec<String>,
    pub error_message: Option<String>,
}

/// Run the agent for one ticker against the configured chat model.
pub async fn process_ticker(config: Arc<Config>, job: TickerJob) -> TickerOutcome {
    let llm = OpenRouterClient::new(config.llm_api_key.clone());
    process_ticker_with(config, job, &llm).await
}

/// Run the agent for one ticker, bounded by the wall-clock budget, and
/// deliver the callback if the job carries a callback URL.
pub async fn process_ticker_with(
    config: Arc<Config>,
    job: TickerJob,
    llm: &dyn LlmClient,
) -> TickerOutcome {
    tracing::info!(
        ticker = %job.ticker,
        report_date = %job.report_date,
        timing = ?job.timing,
        "processing ticker"
    );

    let work_dir = std::env::temp_dir()
        .join("earnings-agent")
        .join(uuid::Uuid::new_v4().to_string());

    let budget = Duration::from_secs(config.ticker_timeout_secs);
    let outcome = match tokio::time::timeout(budget, run_ticker(&config, &job, &work_dir, llm)).await
    {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(ticker = %job.ticker, "ticker run exceeded wall-clock budget");
            TickerOutcome {
                job: job.clone(),
                status: RunStatus::Failed,
                files_updated: 0,
                data_sources: Vec::new(),
                error_message: Some(format!(
                    "run exceeded the {}s wall-clock budget",
                    config.ticker_timeout_secs
                )),
            }
        }
    };

    if work_dir.exists() {
        let _ = std::fs::remove_dir_all(&work_dir);
    }

    if let Some(callback_url) = outcome.job.callback_url.clone() {
        super::callback::send_callback(&callback_url, &config.webhook_secret, &outcome).await;
    }

    outcome
}

/// The run proper: download, per-file loops, cleanup.
async fn run_ticker(
    config: &Config,
    job: &TickerJob,
    work_dir: &Path,
    llm: &dyn LlmClient,
) -> TickerOutcome {
    let storage = StorageClient::new(config);

    let files = match download_files(&storage, job, work_dir).await {
        Ok(files) => files,
        Err(e) => {
            return failed_outcome(job, Vec::new(), 0, e.to_string());
        }
    };

    let mut ctx = AgentContext::new(config, job.clone(), work_dir.to_path_buf(), files);

    if ctx.files.is_empty() {
        ctx.close_all().await;
        return failed_outcome(job, ctx.data_sources, 0, "no files found for ticker".to_string());
    }

    let result = drive_files(config, &mut ctx, &storage, llm).await;

    ctx.close_all().await;

    let files_updated = ctx.files_uploaded.len() as u32;
    match result {
        Ok(()) => TickerOutcome {
            job: job.clone(),
            status: RunStatus::Completed,
            files_updated,
            data_sources: ctx.data_sources,
            error_message: None,
        },
        Err(e) => {
            tracing::error!(ticker = %job.ticker, error = %e, "ticker run failed");
            failed_outcome(job, ctx.data_sources, files_updated, e.to_string())
        }
    }
}

fn failed_outcome(
    job: &TickerJob,
    data_sources: Vec<String>,
    files_updated: u32,
    error_message: String,
) -> TickerOutcome {
    TickerOutcome {
        job: job.clone(),
        status: RunStatus::Failed,
        files_updated,
        data_sources,
        error_message: Some(error_message),
    }
}

/// Download every target file; missing objects and per-file transport
/// failures are skipped here and surface as skipped files.
async fn download_files(
    storage: &StorageClient,
    job: &TickerJob,
    work_dir: &Path,
) -> anyhow::Result<std::collections::HashMap<String, PathBuf>> {
    std::fs::create_dir_all(work_dir)?;
    let key = format!("{}.xlsx", job.ticker);
    let mut files = std::collections::HashMap::new();

    for file in &FILE_ORDER {
        match storage.download(file.bucket, &key).await {
            Ok(bytes) => {
                let dir = work_dir.join(file.bucket);
                std::fs::create_dir_all(&dir)?;
                let local = dir.join(&key);
                std::fs::write(&local, &bytes)?;
                files.insert(file.bucket.to_string(), local);
            }
            Err(StorageError::NotFound { .. }) => {
                tracing::warn!(bucket = file.bucket, ticker = %job.ticker, "file missing, will be skipped");
            }
            Err(e) => {
                tracing::error!(bucket = file.bucket, error = %e, "download failed, file excluded from run");
            }
        }
    }

    Ok(files)
}

/// Walk the fixed file order, running the tool loop per file.
async fn drive_files(
    config: &Config,
    ctx: &mut AgentContext,
    storage: &StorageClient,
    llm: &dyn LlmClient,
) -> anyhow::Result<()> {
    let tools = toolset::definitions();

    for file in &FILE_ORDER {
        if !ctx.files.contains_key(file.bucket) {
            ctx.add_note(
                NoteCategory::FileSkipped,
                format!("{}: not present in the object store", file.bucket),
            );
            continue;
        }

        // Annual statements only roll forward at Q4; the first quarterly
        // insertion tells us which quarter this report covers.
        if file.is_annual() {
            if let Some(quarter) = ctx.detected_quarter.clone() {
                if !is_fourth_quarter(&quarter) {
                    ctx.add_note(
                        NoteCategory::FileSkipped,
                        format!("{}: detected quarter '{}' is not Q4", file.bucket, quarter),
                    );
                    continue;
                }
            }
        }

        if let Err(e) = process_file(config, ctx, storage, llm, &tools, file).await {
            // Fatal errors (login, LLM exhaustion) end the whole run.
            ctx.current_bucket = None;
            return Err(e);
        }
        ctx.current_bucket = None;
    }

    Ok(())
}

/// Run one file: prompt, tool loop, save-and-upload gate.
async fn process_file(
    config: &Config,
    ctx: &mut AgentContext,
    storage: &StorageClient,
    llm: &dyn LlmClient,
    tools: &[ToolDefinition],
    file: &TargetFile,
) -> anyhow::Result<()> {
    tracing::info!(bucket = file.bucket, "processing file");
    ctx.current_bucket = Some(file.bucket.to_string());

    let expected_header = ctx.job.date_header();
    let (sheets, insert_pending) = {
        let workbook = match ctx.workbook(file.bucket) {
            Ok(w) => w,
            Err(e) => {
                ctx.add_note(
                    NoteCategory::Error,
                    format!("{}: failed to open workbook: {}", file.bucket, e),
                );
                return Ok(());
            }
        };
        let sheets = match schema::analyze(workbook) {
            Ok(s) => s,
            Err(e) => {
                ctx.add_note(
                    NoteCategory::Error,
                    format!("{}: failed to analyze workbook: {}", file.bucket, e),
                );
                return Ok(());
            }
        };
        let insert_pending = needs_new_column(&sheets, &expected_header);
        (sheets, insert_pending)
    };

    let system = prompts::system_prompt(&ctx.job, file, config.max_iterations, &ctx.note_summary());
    let user = prompts::first_user_message(&ctx.job, file, &sheets, insert_pending);

    let mut messages = vec![
        ChatMessage::new(Role::System, system),
        ChatMessage::new(Role::User, user),
    ];

    run_tool_loop(config, ctx, llm, tools, &mut messages, file).await?;

    finalize_file(ctx, storage, file).await;
    Ok(())
}

/// The bounded tool-calling loop for one file.
///
/// The message history grows monotonically: each iteration either yields
/// tool calls (dispatch in emission order, append results, continue) or a
/// final text (exit). Exhausting the budget finalizes the file with
/// whatever was written.
async fn run_tool_loop(
    config: &Config,
    ctx: &mut AgentContext,
    llm: &dyn LlmClient,
    tools: &[ToolDefinition],
    messages: &mut Vec<ChatMessage>,
    file: &TargetFile,
) -> anyhow::Result<()> {
    for iteration in 1..=config.max_iterations {
        tracing::debug!(bucket = file.bucket, iteration, "tool loop iteration");

        let response = call_llm_with_retry(config, llm, messages, tools).await?;

        if !response.has_tool_calls() {
            tracing::info!(bucket = file.bucket, iteration, "agent finished file");
            return Ok(());
        }

        let tool_calls = response.tool_calls.clone().unwrap_or_default();

        // Re-send the assistant turn with its opaque reasoning payload
        // intact; some providers reject the continuation without it.
        messages.push(
            ChatMessage {
                role: Role::Assistant,
                content: response.content.clone(),
                tool_calls: Some(tool_calls.clone()),
                tool_call_id: None,
                reasoning: None,
            }
            .with_reasoning(response.reasoning.clone()),
        );

        for tool_call in &tool_calls {
            let args: Value =
                serde_json::from_str(&tool_call.function.arguments).unwrap_or(Value::Null);
            tracing::info!(
                bucket = file.bucket,
                tool = %tool_call.function.name,
                "dispatching tool call"
            );

            let result = toolset::dispatch(ctx, &tool_call.function.name, args).await?;
            messages.push(ChatMessage::tool_result(tool_call.id.clone(), result));
        }
    }

    ctx.add_note(
        NoteCategory::Error,
        format!(
            "{}: iteration budget ({}) exhausted, finalizing with what was written",
            file.bucket, config.max_iterations
        ),
    );
    Ok(())
}

/// One LLM call with bounded retry on transient failures.
async fn call_llm_with_retry(
    config: &Config,
    llm: &dyn LlmClient,
    messages: &[ChatMessage],
    tools: &[ToolDefinition],
) -> anyhow::Result<ChatResponse> {
    let retry = RetryConfig::default();
    let options = ChatOptions {
        temperature: None,
        max_tokens: Some(LLM_MAX_TOKENS),
    };

    let mut attempt = 0;
    loop {
        match llm
            .chat_completion(&config.model, messages, Some(tools), options.clone())
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) if retry.should_retry(&e, attempt) => {
                let delay = e.suggested_delay(attempt);
                tracing::warn!(attempt, error = %e, "transient LLM error, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(anyhow::anyhow!("LLM call failed: {}", e)),
        }
    }
}

/// Save and upload a file, gated on at least one cell write.
async fn finalize_file(ctx: &mut AgentContext, storage: &StorageClient, file: &TargetFile) {
    let written = ctx.cells_written_for(file.bucket);
    if written == 0 {
        tracing::warn!(
            bucket = file.bucket,
            "no cells were written, skipping upload"
        );
        return;
    }

    let key = format!("{}.xlsx", ctx.job.ticker);

    let bytes = {
        let workbook = match ctx.workbook(file.bucket) {
            Ok(w) => w,
            Err(e) => {
                ctx.add_note(
                    NoteCategory::Error,
                    format!("{}: could not reopen workbook for save: {}", file.bucket, e),
                );
                return;
            }
        };
        if let Err(e) = workbook.save() {
            ctx.add_note(
                NoteCategory::Error,
                format!("{}: save failed: {}", file.bucket, e),
            );
            return;
        }
        match std::fs::read(workbook.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                ctx.add_note(
                    NoteCategory::Error,
                    format!("{}: could not read saved workbook: {}", file.bucket, e),
                );
                return;
            }
        }
    };

    match storage.upload(file.bucket, &key, bytes).await {
        Ok(()) => {
            ctx.files_uploaded.push(file.bucket.to_string());
            ctx.add_note(
                NoteCategory::FileCompleted,
                format!("{}: {} cells written, uploaded", file.bucket, written),
            );
        }
        Err(e) => {
            ctx.add_note(
                NoteCategory::Error,
                format!("{}: upload failed: {}", file.bucket, e),
            );
        }
    }
}

/// Whether the leftmost data column already covers the expected period.
fn needs_new_column(sheets: &[SheetStructure], expected_date_header: &str) -> bool {
    let Some(sheet) = sheets.first() else {
        return false;
    };
    match sheet.period_dates.get(1) {
        Some(b1) => b1 != expected_date_header,
        None => true,
    }
}
