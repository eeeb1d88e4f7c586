//! Vision extraction of financial tables from page screenshots.
//!
//! The extraction prompt is pinned here, not supplied by the agent: the
//! model must return the table verbatim, fully written out, or the
//! downstream format invariants cannot hold.

use std::time::Duration;

use base64::Engine as _;
use serde_json::json;

const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";

/// Large statement tables need room; never truncate an extraction.
const MAX_OUTPUT_TOKENS: u32 = 12_288;

const EXTRACTION_PROMPT: &str = "Extract the financial statement table from this screenshot as a \
markdown table. Include the leftmost row-label column and the three newest data columns only. \
Preserve the column headers exactly as shown. Copy every numeric value exactly as displayed: \
fully written absolute numbers, no rounding, no abbreviations such as B or M. Keep parentheses \
for negative values and a dash for blank cells.";

/// Stateless client for the vision model endpoint.
pub struct VisionClient {
    client: reqwest::Client,
    api_key: String,
}

impl VisionClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self { client, api_key }
    }

    /// Send a PNG screenshot through the fixed extraction prompt and
    /// return the raw markdown the model produced.
    pub async fn extract_table(&self, screenshot_png: &[u8]) -> anyhow::Result<String> {
        let img_b64 = base64::engine::general_purpose::STANDARD.encode(screenshot_png);

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": EXTRACTION_PROMPT },
                    { "inline_data": { "mime_type": "image/png", "data": img_b64 } },
                ]
            }],
            "generationConfig": {
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
                "temperature": 0.1,
            },
        });

        let response = self
            .client
            .post(format!("{}?key={}", GEMINI_URL, self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "vision API error {}: {}",
                status,
                text.chars().take(500).collect::<String>()
            );
        }

        let data: serde_json::Value = response.json().await?;
        let text = data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("vision API returned no text candidate"))?;

        Ok(text.to_string())
    }
}
