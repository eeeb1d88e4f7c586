//! Object-store client for the spreadsheet buckets.
//!
//! Downloads use the public-read object path; uploads go through the
//! authenticated path with the service credential and upsert semantics.
//! The client is stateless; retries, if any, belong to the orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::config::Config;

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum StorageError {
    /// The object does not exist in the bucket. Downgraded by the
    /// orchestrator to "file skipped".
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("storage request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("storage transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the external object store holding the spreadsheet buckets.
pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl StorageClient {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");

        Self {
            client,
            base_url: config.storage_url.trim_end_matches('/').to_string(),
            service_key: config.storage_service_key.clone(),
        }
    }

    /// Download one object. Distinguishes not-found from transport failure.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let url = format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, key);

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(bucket, key, size = bytes.len(), "downloaded object");
        Ok(bytes.to_vec())
    }

    /// Upload one object through the authenticated path (upsert).
    pub async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, key);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Content-Type", XLSX_CONTENT_TYPE)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(bucket, key, status = status.as_u16(), "upload failed");
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(bucket, key, "uploaded object");
        Ok(())
    }
}
