//! Wire types exchanged with the generation backend.
//!
//! Statuses are accepted in any letter case and timestamps either as
//! RFC 3339 or as naive ISO-8601 (interpreted as UTC), because the backend
//! emits both depending on the code path.

use chrono::{DateTime, NaiveDateTime, Utc};
use gentrack_core::reconcile::TaskUpdate;
use gentrack_core::task::{AssetType, TaskStatus};
use gentrack_core::types::{JobId, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Push channel
// ---------------------------------------------------------------------------

/// One status change announced on the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushMessage {
    pub job_id: JobId,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: Timestamp,
}

impl From<PushMessage> for TaskUpdate {
    fn from(msg: PushMessage) -> Self {
        TaskUpdate {
            id: msg.job_id,
            status: msg.status,
            result_url: msg.result_url,
            error: msg.error,
            server_time: msg.updated_at,
        }
    }
}

/// Parse the `data` payload of one push event.
pub fn parse_push_message(data: &str) -> Result<PushMessage, serde_json::Error> {
    serde_json::from_str(data)
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Response of `POST /api/assets/generate`.
///
/// The backend may hand back an existing job for a duplicate prompt, so
/// `status` is not necessarily `PENDING`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Batch status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatusRequest<'a> {
    pub task_ids: &'a [JobId],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchStatusResponse {
    #[serde(default)]
    pub tasks: Vec<BatchTask>,
}

/// Authoritative state of one job as reported by the batch endpoint.
///
/// Unknown fields in the payload are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchTask {
    pub job_id: JobId,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: TaskStatus,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: Timestamp,
    #[serde(default)]
    pub asset_type: Option<AssetType>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: Timestamp,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl From<BatchTask> for TaskUpdate {
    fn from(task: BatchTask) -> Self {
        TaskUpdate {
            id: task.job_id,
            status: task.status,
            result_url: task.result_url,
            error: task.error_message,
            server_time: task.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient field parsers
// ---------------------------------------------------------------------------

fn deserialize_status<'de, D>(deserializer: D) -> Result<TaskStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    TaskStatus::parse(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown task status: {raw}")))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one assumed to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_push_message_with_zulu_time() {
        let msg = parse_push_message(
            r#"{"job_id":"j1","status":"COMPLETED","result_url":"/static/j1.png","error":null,"updated_at":"2025-01-02T03:04:05.123456Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.job_id, "j1");
        assert_eq!(msg.status, TaskStatus::Completed);
        assert_eq!(msg.result_url.as_deref(), Some("/static/j1.png"));
        assert!(msg.error.is_none());
    }

    #[test]
    fn status_is_case_insensitive() {
        let msg = parse_push_message(
            r#"{"job_id":"j1","status":"processing","updated_at":"2025-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.status, TaskStatus::Processing);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(parse_push_message(
            r#"{"job_id":"j1","status":"QUEUED","updated_at":"2025-01-02T03:04:05Z"}"#
        )
        .is_err());
    }

    #[test]
    fn missing_job_id_is_rejected() {
        assert!(parse_push_message(r#"{"status":"FAILED","updated_at":"2025-01-02T03:04:05Z"}"#).is_err());
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp("2025-01-02T03:04:05"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02 03:04:05"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02T05:04:05+02:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn batch_task_maps_error_message_and_ignores_extras() {
        let response: BatchStatusResponse = serde_json::from_str(
            r#"{"tasks":[{
                "id": 7, "prompt": "a cat", "model": "imagen",
                "job_id": "j7", "status": "FAILED", "asset_type": "IMAGE",
                "created_at": "2025-01-02T03:00:00", "updated_at": "2025-01-02T03:05:00",
                "result_url": null, "error_message": "quota exceeded",
                "similarity_score": null
            }]}"#,
        )
        .unwrap();
        let update: TaskUpdate = response.tasks[0].clone().into();
        assert_eq!(update.id, "j7");
        assert_eq!(update.status, TaskStatus::Failed);
        assert_eq!(update.error.as_deref(), Some("quota exceeded"));
        assert_eq!(update.server_time, Utc.with_ymd_and_hms(2025, 1, 2, 3, 5, 0).unwrap());
        assert_eq!(response.tasks[0].asset_type, Some(AssetType::Image));
    }

    #[test]
    fn batch_request_omits_missing_sync_time() {
        let ids = vec!["a".to_string()];
        let json = serde_json::to_value(BatchStatusRequest {
            task_ids: &ids,
            last_sync_time: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"task_ids": ["a"]}));
    }

    #[test]
    fn submit_response_accepts_reused_job() {
        let response: SubmitResponse =
            serde_json::from_str(r#"{"job_id":"j1","status":"COMPLETED","message":"reused"}"#).unwrap();
        assert_eq!(response.status, TaskStatus::Completed);
        assert_eq!(response.message.as_deref(), Some("reused"));
    }
}
