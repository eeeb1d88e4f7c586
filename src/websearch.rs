//! Secondary web-search client for validation and gap-filling.
//!
//! Calls a chat-style search API grounded in live web sources. The system
//! message pins the numeric-format contract so answers arrive as fully
//! written absolute numbers.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

const PERPLEXITY_URL: &str = "https://api.perplexity.ai/chat/completions";

const SEARCH_SYSTEM_PROMPT: &str = "You are a financial data assistant. Provide precise \
numerical financial data. Always give fully written out absolute numbers (e.g., 394328000000 \
not 394.33B). Cite your sources.";

/// Answer plus the sources that ground it.
#[derive(Debug, Clone)]
pub struct SearchAnswer {
    pub answer: String,
    pub citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    choices: Vec<SearchChoice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchChoice {
    message: SearchMessage,
}

#[derive(Debug, Deserialize)]
struct SearchMessage {
    content: String,
}

/// Stateless client for the web-search API.
pub struct SearchClient {
    client: reqwest::Client,
    api_key: String,
}

impl SearchClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { client, api_key }
    }

    /// Run one query. Errors are returned to the caller, which surfaces
    /// them to the model as structured payloads.
    pub async fn search(&self, query: &str) -> anyhow::Result<SearchAnswer> {
        let body = json!({
            "model": "sonar-pro",
            "messages": [
                { "role": "system", "content": SEARCH_SYSTEM_PROMPT },
                { "role": "user", "content": query },
            ],
        });

        let response = self
            .client
            .post(PERPLEXITY_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("web-search API error: {}", status);
        }

        let parsed: SearchResponse = response.json().await?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("web-search API returned no choices"))?;

        Ok(SearchAnswer {
            answer,
            citations: parsed.citations,
        })
    }
}
