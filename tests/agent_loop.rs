//! End-to-end ticker runs against a scripted chat model and an in-process
//! object store: upload gating, the Q4 annual gate, the date-header
//! override, and callback delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};

use earnings_agent::agent::{process_ticker_with, RunStatus, TickerJob, Timing};
use earnings_agent::config::Config;
use earnings_agent::llm::{
    ChatMessage, ChatOptions, ChatResponse, FunctionCall, LlmClient, LlmError, ToolCall,
    ToolDefinition,
};

// ---------------------------------------------------------------------------
// Scripted chat model
// ---------------------------------------------------------------------------

struct MockLlm {
    responses: Mutex<VecDeque<ChatResponse>>,
    calls: AtomicUsize,
}

impl MockLlm {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    async fn chat_completion(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
        _options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(stop))
    }
}

fn stop() -> ChatResponse {
    ChatResponse {
        content: Some("Done.".to_string()),
        tool_calls: None,
        finish_reason: Some("stop".to_string()),
        reasoning: None,
    }
}

fn tool_call(name: &str, args: Value) -> ChatResponse {
    ChatResponse {
        content: None,
        tool_calls: Some(vec![ToolCall {
            id: format!("call-{}", name),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: args.to_string(),
                thought_signature: None,
            },
            thought_signature: None,
        }]),
        finish_reason: Some("tool_calls".to_string()),
        reasoning: None,
    }
}

// ---------------------------------------------------------------------------
// In-process object store and callback receiver
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MockStore {
    fixtures: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    uploads: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    callbacks: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn serve_mock(store: MockStore) -> String {
    let app = Router::new()
        .route("/storage/v1/object/public/:bucket/:key", get(download))
        .route("/storage/v1/object/:bucket/:key", post(upload))
        .route("/callback", post(callback))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn download(
    State(store): State<MockStore>,
    Path((bucket, key)): Path<(String, String)>,
) -> impl IntoResponse {
    match store.fixtures.lock().unwrap().get(&format!("{}/{}", bucket, key)) {
        Some(bytes) => (StatusCode::OK, bytes.clone()),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}

async fn upload(
    State(store): State<MockStore>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> StatusCode {
    store
        .uploads
        .lock()
        .unwrap()
        .insert(format!("{}/{}", bucket, key), body.to_vec());
    StatusCode::OK
}

async fn callback(
    State(store): State<MockStore>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    store.callbacks.lock().unwrap().push((auth, payload));
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A statement workbook whose leftmost period is Q3 2026 (ending
/// 2025-10-31): the run under test reports the following period.
fn fixture_bytes() -> Vec<u8> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_by_name_mut("Sheet1").unwrap();

    sheet.get_cell_mut("B1").set_value_string("2025-10-31");
    sheet.get_cell_mut("C1").set_value_string("2025-07-31");
    sheet.get_cell_mut("B2").set_value_string("Q3 2026");
    sheet.get_cell_mut("C2").set_value_string("Q2 2026");
    sheet.get_cell_mut("A3").set_value_string("Revenue");
    sheet.get_cell_mut("B3").set_value_number(1_178_000_000.0);
    sheet.get_cell_mut("C3").set_value_number(1_162_000_000.0);
    sheet.get_cell_mut("A4").set_value_string("Net Income");
    sheet.get_cell_mut("B4").set_value_number(207_000_000.0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.xlsx");
    umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();
    std::fs::read(&path).unwrap()
}

fn job(base_url: &str) -> TickerJob {
    TickerJob {
        ticker: "ZM".to_string(),
        report_date: NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
        fiscal_period_end: Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
        timing: Timing::Afterhours,
        callback_url: Some(format!("{}/callback", base_url)),
    }
}

fn config(base_url: &str) -> Arc<Config> {
    let mut config = Config::for_tests();
    config.storage_url = base_url.to_string();
    Arc::new(config)
}

fn seed(store: &MockStore, bucket: &str) {
    store
        .fixtures
        .lock()
        .unwrap()
        .insert(format!("{}/ZM.xlsx", bucket), fixture_bytes());
}

fn insert_call(period_header: &str) -> ChatResponse {
    tool_call(
        "insert_new_period_column",
        json!({
            "sheet_name": "Sheet1",
            // Deliberately wrong: the system must override it.
            "date_header": "1999-01-01",
            "period_header": period_header,
        }),
    )
}

fn update_call(cell_ref: &str, value: Value) -> ChatResponse {
    tool_call(
        "update_excel_cell",
        json!({ "sheet_name": "Sheet1", "cell_ref": cell_ref, "value": value }),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn q4_report_rolls_annual_files_forward() {
    let store = MockStore::default();
    seed(&store, "financials-quarterly-income");
    seed(&store, "financials-annual-income");
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![
        // quarterly-income
        insert_call("Q4 2026"),
        update_call("B3", json!(1_201_000_000u64)),
        stop(),
        // annual-income (gate passes: Q4 detected)
        insert_call("FY 2026"),
        update_call("B3", json!(4_700_000_000u64)),
        stop(),
    ]);

    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.files_updated, 2);

    let uploads = store.uploads.lock().unwrap();
    assert!(uploads.contains_key("financials-quarterly-income/ZM.xlsx"));
    assert!(uploads.contains_key("financials-annual-income/ZM.xlsx"));

    // The uploaded quarterly workbook carries the overridden date header,
    // the agent's period label, and the written value.
    let bytes = uploads
        .get("financials-quarterly-income/ZM.xlsx")
        .unwrap()
        .clone();
    drop(uploads);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uploaded.xlsx");
    std::fs::write(&path, bytes).unwrap();
    let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
    let sheet = book.get_sheet_by_name("Sheet1").unwrap();
    assert_eq!(sheet.get_value((2u32, 1u32)), "2026-01-31");
    assert_eq!(sheet.get_value((2u32, 2u32)), "Q4 2026");
    assert_eq!(sheet.get_value((2u32, 3u32)), "1201000000");
    // Previous leftmost column shifted intact.
    assert_eq!(sheet.get_value((3u32, 1u32)), "2025-10-31");
    assert_eq!(sheet.get_value((3u32, 3u32)), "1178000000");
}

#[tokio::test]
async fn non_q4_report_skips_annual_files() {
    let store = MockStore::default();
    seed(&store, "financials-quarterly-income");
    seed(&store, "financials-annual-income");
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![
        insert_call("Q1 2026"),
        update_call("B3", json!(1_201_000_000u64)),
        stop(),
    ]);

    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.files_updated, 1);

    let uploads = store.uploads.lock().unwrap();
    assert!(uploads.contains_key("financials-quarterly-income/ZM.xlsx"));
    assert!(!uploads.contains_key("financials-annual-income/ZM.xlsx"));
    drop(uploads);

    // The annual file never reached the model: three calls for the
    // quarterly file, none after the gate.
    assert_eq!(llm.call_count(), 3);
}

#[tokio::test]
async fn inserted_column_without_writes_is_not_uploaded() {
    let store = MockStore::default();
    seed(&store, "financials-quarterly-income");
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![insert_call("Q4 2026"), stop()]);

    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.files_updated, 0);
    assert!(store.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn conflicting_write_is_refused_and_the_agent_can_retry() {
    let store = MockStore::default();
    seed(&store, "financials-quarterly-income");
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![
        // B4 already holds a value; C4 is a historical gap.
        update_call("B4", json!(1u64)),
        update_call("C4", json!(219_000_000u64)),
        stop(),
    ]);

    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.files_updated, 1);

    let uploads = store.uploads.lock().unwrap();
    let bytes = uploads
        .get("financials-quarterly-income/ZM.xlsx")
        .unwrap()
        .clone();
    drop(uploads);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uploaded.xlsx");
    std::fs::write(&path, bytes).unwrap();
    let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
    let sheet = book.get_sheet_by_name("Sheet1").unwrap();
    // The refused write left B4 untouched; the retry landed in C4.
    assert_eq!(sheet.get_value((2u32, 4u32)), "207000000");
    assert_eq!(sheet.get_value((3u32, 4u32)), "219000000");
}

#[tokio::test]
async fn abbreviated_values_are_refused_before_reaching_the_workbook() {
    let store = MockStore::default();
    seed(&store, "financials-quarterly-income");
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![
        update_call("C4", json!("1.2B")),
        update_call("C4", json!("1,200,000,000")),
        stop(),
    ]);

    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;
    assert_eq!(outcome.files_updated, 1);

    let uploads = store.uploads.lock().unwrap();
    let bytes = uploads
        .get("financials-quarterly-income/ZM.xlsx")
        .unwrap()
        .clone();
    drop(uploads);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uploaded.xlsx");
    std::fs::write(&path, bytes).unwrap();
    let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
    let sheet = book.get_sheet_by_name("Sheet1").unwrap();
    assert_eq!(sheet.get_value((3u32, 4u32)), "1200000000");
}

#[tokio::test]
async fn callback_echoes_the_job_identity() {
    let store = MockStore::default();
    seed(&store, "financials-quarterly-income");
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![
        insert_call("Q1 2026"),
        update_call("B3", json!(1_201_000_000u64)),
        stop(),
    ]);

    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;
    assert_eq!(outcome.status, RunStatus::Completed);

    let callbacks = store.callbacks.lock().unwrap();
    assert_eq!(callbacks.len(), 1);
    let (auth, payload) = &callbacks[0];

    assert_eq!(auth.as_deref(), Some("Bearer webhook-secret"));
    assert_eq!(payload["ticker"], "ZM");
    assert_eq!(payload["report_date"], "2026-02-28");
    assert_eq!(payload["timing"], "afterhours");
    assert_eq!(payload["status"], "completed");
    assert_eq!(payload["files_updated"], 1);
    assert!(payload.get("error_message").is_none());
}

#[tokio::test]
async fn missing_files_are_skipped_and_the_rest_proceed() {
    let store = MockStore::default();
    // Only one of the six buckets has a file.
    seed(&store, "financials-quarterly-balance");
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![
        insert_call("Q1 2026"),
        update_call("B3", json!(9_000_000_000u64)),
        stop(),
    ]);

    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.files_updated, 1);
    assert!(store
        .uploads
        .lock()
        .unwrap()
        .contains_key("financials-quarterly-balance/ZM.xlsx"));
}

#[tokio::test]
async fn empty_object_store_fails_the_run() {
    let store = MockStore::default();
    let base_url = serve_mock(store.clone()).await;

    let llm = MockLlm::new(vec![]);
    let outcome = process_ticker_with(config(&base_url), job(&base_url), &llm).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.files_updated, 0);
    assert_eq!(llm.call_count(), 0);

    let callbacks = store.callbacks.lock().unwrap();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].1["status"], "failed");
    assert!(callbacks[0].1["error_message"].as_str().is_some());
}
