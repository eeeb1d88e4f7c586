//! Terminal status callback.
//!
//! Posts the run outcome to the caller-provided URL with the shared
//! bearer secret. One retry after a short delay on transport failure;
//! a final failure is logged and swallowed, never re-thrown.

use std::time::Duration;

use serde::Serialize;

use super::orchestrator::{RunStatus, TickerOutcome};
use super::Timing;

const CALLBACK_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Payload posted to the callback URL. The `(ticker, report_date,
/// timing)` triple echoes the invocation verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackPayload {
    pub ticker: String,
    pub report_date: String,
    pub timing: Timing,
    pub status: RunStatus,
    pub files_updated: u32,
    pub data_sources_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&TickerOutcome> for CallbackPayload {
    fn from(outcome: &TickerOutcome) -> Self {
        Self {
            ticker: outcome.job.ticker.clone(),
            report_date: outcome.job.report_date.format("%Y-%m-%d").to_string(),
            timing: outcome.job.timing,
            status: outcome.status,
            files_updated: outcome.files_updated,
            data_sources_used: outcome.data_sources.clone(),
            error_message: outcome.error_message.clone(),
        }
    }
}

/// Deliver the callback. Never fails the caller.
pub async fn send_callback(callback_url: &str, secret: &str, outcome: &TickerOutcome) {
    let payload = CallbackPayload::from(outcome);

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("could not build callback client: {}", e);
            return;
        }
    };

    for attempt in 1..=2u32 {
        let result = client
            .post(callback_url)
            .header("Authorization", format!("Bearer {}", secret))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) => {
                tracing::info!(
                    ticker = %payload.ticker,
                    status = response.status().as_u16(),
                    "callback delivered"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(ticker = %payload.ticker, attempt, "callback attempt failed: {}", e);
                if attempt == 1 {
                    tokio::time::sleep(CALLBACK_RETRY_DELAY).await;
                }
            }
        }
    }

    tracing::error!(ticker = %payload.ticker, "callback delivery failed after retry");
}
