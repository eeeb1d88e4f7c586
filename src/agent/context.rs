//! Mutable state for one ticker run.
//!
//! The context owns every stateful resource the tools touch: the open
//! workbooks, the lazily started browser session, the scratchpad, and the
//! per-file write counters. It is created at run start and torn down on
//! every exit path.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::browser::{BrowserError, SiteBrowser};
use crate::config::Config;
use crate::vision::VisionClient;
use crate::websearch::SearchClient;
use crate::workbook::{WorkbookError, WorkbookMutator};

use super::TickerJob;

/// Category tag for a scratchpad note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteCategory {
    DataGathered,
    EmptyCells,
    Validation,
    Decision,
    Error,
    FileSkipped,
    FileCompleted,
}

impl NoteCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data_gathered" => Some(Self::DataGathered),
            "empty_cells" => Some(Self::EmptyCells),
            "validation" => Some(Self::Validation),
            "decision" => Some(Self::Decision),
            "error" => Some(Self::Error),
            "file_skipped" => Some(Self::FileSkipped),
            "file_completed" => Some(Self::FileCompleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataGathered => "data_gathered",
            Self::EmptyCells => "empty_cells",
            Self::Validation => "validation",
            Self::Decision => "decision",
            Self::Error => "error",
            Self::FileSkipped => "file_skipped",
            Self::FileCompleted => "file_completed",
        }
    }
}

/// One scratchpad entry. Append-only across the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub category: NoteCategory,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// State for a running ticker agent.
pub struct AgentContext {
    pub job: TickerJob,
    pub work_dir: PathBuf,
    /// Downloaded files, bucket name to local path.
    pub files: HashMap<String, PathBuf>,
    /// Open mutators, created lazily per file.
    workbooks: HashMap<String, WorkbookMutator>,
    /// Persistent browser session, started lazily on first browse call.
    browser: Option<SiteBrowser>,
    pub vision: VisionClient,
    pub search: SearchClient,
    /// Bucket currently being processed by the file loop.
    pub current_bucket: Option<String>,
    /// Per-bucket count of successful cell writes.
    cells_written: HashMap<String, u32>,
    /// Period label recorded at the first quarterly column insertion.
    pub detected_quarter: Option<String>,
    /// Buckets whose files were saved and uploaded.
    pub files_uploaded: Vec<String>,
    pub notes: Vec<Note>,
    pub data_sources: Vec<String>,
    site_username: String,
    site_password: String,
}

impl AgentContext {
    pub fn new(
        config: &Config,
        job: TickerJob,
        work_dir: PathBuf,
        files: HashMap<String, PathBuf>,
    ) -> Self {
        Self {
            job,
            work_dir,
            files,
            workbooks: HashMap::new(),
            browser: None,
            vision: VisionClient::new(config.vision_api_key.clone()),
            search: SearchClient::new(config.search_api_key.clone()),
            current_bucket: None,
            cells_written: HashMap::new(),
            detected_quarter: None,
            files_uploaded: Vec::new(),
            notes: Vec::new(),
            data_sources: Vec::new(),
            site_username: config.site_username.clone(),
            site_password: config.site_password.clone(),
        }
    }

    /// The persistent browser, launching it on first use.
    pub async fn browser(&mut self) -> Result<&mut SiteBrowser, BrowserError> {
        if self.browser.is_none() {
            tracing::info!("starting persistent browser session");
            let browser =
                SiteBrowser::launch(self.site_username.clone(), self.site_password.clone()).await?;
            self.browser = Some(browser);
        }
        Ok(self.browser.as_mut().expect("browser just initialized"))
    }

    /// Latest screenshot captured by the browser, if any.
    pub fn latest_screenshot(&self) -> Option<&[u8]> {
        self.browser.as_ref().and_then(|b| b.latest_screenshot())
    }

    /// The mutator for `bucket`, opening the workbook lazily.
    pub fn workbook(&mut self, bucket: &str) -> Result<&mut WorkbookMutator, WorkbookError> {
        if !self.workbooks.contains_key(bucket) {
            let path = self
                .files
                .get(bucket)
                .ok_or_else(|| WorkbookError::SheetNotFound(format!("no file for {}", bucket)))?
                .clone();
            let mutator = WorkbookMutator::open(&path)?;
            self.workbooks.insert(bucket.to_string(), mutator);
        }
        Ok(self.workbooks.get_mut(bucket).expect("workbook just opened"))
    }

    /// The mutator for the file currently being processed.
    pub fn current_workbook(&mut self) -> Result<&mut WorkbookMutator, WorkbookError> {
        let bucket = self
            .current_bucket
            .clone()
            .ok_or_else(|| WorkbookError::SheetNotFound("no file selected".to_string()))?;
        self.workbook(&bucket)
    }

    pub fn add_note(&mut self, category: NoteCategory, content: impl Into<String>) {
        let content = content.into();
        tracing::info!(category = category.as_str(), "{}", content);
        self.notes.push(Note {
            category,
            content,
            timestamp: Utc::now(),
        });
    }

    /// Register a data-source identifier for the callback, deduplicated.
    pub fn record_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if !self.data_sources.contains(&source) {
            self.data_sources.push(source);
        }
    }

    pub fn record_cell_written(&mut self) {
        if let Some(bucket) = &self.current_bucket {
            *self.cells_written.entry(bucket.clone()).or_insert(0) += 1;
        }
    }

    pub fn cells_written_for(&self, bucket: &str) -> u32 {
        self.cells_written.get(bucket).copied().unwrap_or(0)
    }

    /// Scratchpad rendered for the next file's system prompt.
    pub fn note_summary(&self) -> String {
        if self.notes.is_empty() {
            return "(no notes yet)".to_string();
        }
        self.notes
            .iter()
            .map(|n| {
                let mut content = n.content.clone();
                if content.len() > 300 {
                    content.truncate(300);
                    content.push_str("...");
                }
                format!("[{}] {}", n.category.as_str(), content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Close the browser and drop every open workbook. Called on every
    /// exit path; unsaved changes are intentionally discarded.
    pub async fn close_all(&mut self) {
        self.workbooks.clear();
        if let Some(browser) = self.browser.take() {
            browser.close().await;
        }
    }
}
