//! Long-lived push listener.
//!
//! [`PushListener::run`] keeps a connection to the backend event stream
//! open, decodes every `message` event into a [`TaskUpdate`] and forwards
//! it over an mpsc channel. Whenever the stream ends or fails it waits for
//! the reconnect delay and connects again, until cancelled. The delay is
//! fixed, with no backoff. Malformed payloads are logged and dropped
//! without closing the stream.

use std::time::Duration;

use futures::StreamExt;
use gentrack_core::reconcile::TaskUpdate;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, GenerationApi};
use crate::messages::parse_push_message;
use crate::sse::SseDecoder;

/// Delay between a dropped stream and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Errors from one connection of the push stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to open event stream: {0}")]
    Connect(#[from] ApiError),

    #[error("Event stream transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// How one connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// The server closed the body.
    Closed,
    Cancelled,
    /// Nobody is consuming updates any more.
    ReceiverDropped,
}

pub struct PushListener {
    api: GenerationApi,
    reconnect_delay: Duration,
}

impl PushListener {
    pub fn new(api: GenerationApi, reconnect_delay: Duration) -> Self {
        Self { api, reconnect_delay }
    }

    /// Run until `cancel` fires or the receiving side of `updates` is dropped.
    pub async fn run(&self, updates: mpsc::Sender<TaskUpdate>, cancel: CancellationToken) {
        let url = self.api.stream_url();
        let delay = self.reconnect_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.consume(&updates, &cancel).await {
                Ok(StreamEnd::Cancelled) | Ok(StreamEnd::ReceiverDropped) => break,
                Ok(StreamEnd::Closed) => {
                    tracing::info!(url = %url, "Event stream closed by server");
                }
                Err(e) => {
                    tracing::warn!(url = %url, attempt, error = %e, "Event stream failed");
                }
            }

            tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnecting to event stream");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(url = %url, "Push listener stopped");
    }

    /// One connection: open, decode and forward until it ends.
    async fn consume(
        &self,
        updates: &mpsc::Sender<TaskUpdate>,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, StreamError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            response = self.api.open_stream() => response?,
        };
        tracing::info!(url = %self.api.stream_url(), "Event stream connected");

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                return Ok(StreamEnd::Closed);
            };

            for event in decoder.feed(&chunk?) {
                if !event.is_message() {
                    continue;
                }
                let message = match parse_push_message(&event.data) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(error = %e, payload = %event.data, "Dropping malformed push message");
                        continue;
                    }
                };
                tracing::debug!(job_id = %message.job_id, status = %message.status, "Push update received");
                if updates.send(message.into()).await.is_err() {
                    return Ok(StreamEnd::ReceiverDropped);
                }
            }
        }
    }
}
