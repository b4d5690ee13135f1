//! REST client for the generation backend.
//!
//! Wraps job submission, batch status and opening the event stream
//! using [`reqwest`].

use gentrack_core::submission::SubmitRequest;
use gentrack_core::types::{JobId, Timestamp};
use reqwest::multipart::{Form, Part};

use crate::messages::{BatchStatusRequest, BatchStatusResponse, BatchTask, SubmitResponse};

/// Largest id set the batch status endpoint accepts in one request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend error ({status}): {body}")]
    Status {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    #[error("Batch of {count} ids exceeds the limit of {max}")]
    BatchTooLarge { count: usize, max: usize },
}

/// HTTP client for one generation backend.
#[derive(Debug, Clone)]
pub struct GenerationApi {
    client: reqwest::Client,
    base_url: String,
}

impl GenerationApi {
    /// * `base_url` - e.g. `http://localhost:8000`, without the `/api` prefix.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stream_url(&self) -> String {
        format!("{}/api/assets/stream", self.base_url)
    }

    /// Submit a generation job.
    ///
    /// Sends `POST /api/assets/generate` as `multipart/form-data`. The
    /// request is not validated here; callers check it first.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError> {
        let mut form = Form::new()
            .text("prompt", request.prompt.clone())
            .text("mode", request.mode.as_str());

        if let Some(image) = &request.source_image {
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)?;
            form = form.part("source_image", part);
        }

        let response = self
            .client
            .post(format!("{}/api/assets/generate", self.base_url))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the authoritative state of up to [`MAX_BATCH_SIZE`] jobs.
    ///
    /// Sends `POST /api/assets/batch-status`. Ids the backend does not
    /// know are simply absent from the result.
    pub async fn batch_status(
        &self,
        task_ids: &[JobId],
        last_sync_time: Option<Timestamp>,
    ) -> Result<Vec<BatchTask>, ApiError> {
        if task_ids.len() > MAX_BATCH_SIZE {
            return Err(ApiError::BatchTooLarge {
                count: task_ids.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        let response = self
            .client
            .post(format!("{}/api/assets/batch-status", self.base_url))
            .json(&BatchStatusRequest {
                task_ids,
                last_sync_time,
            })
            .send()
            .await?;

        let body: BatchStatusResponse = Self::parse_response(response).await?;
        Ok(body.tasks)
    }

    /// Open `GET /api/assets/stream`. The caller consumes the body.
    pub async fn open_stream(&self) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .get(self.stream_url())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        Self::ensure_success(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
