//! The tracked task record and its enumerations.
//!
//! String forms match the backend: statuses are upper-case
//! (`"PENDING"`), generation modes are kebab-case (`"text-to-image"`),
//! asset types are upper-case (`"IMAGE"`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// GenerationMode
// ---------------------------------------------------------------------------

/// Kind of generation requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    #[default]
    TextToImage,
    TextToVideo,
    ImageToVideo,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "text-to-image",
            GenerationMode::TextToVideo => "text-to-video",
            GenerationMode::ImageToVideo => "image-to-video",
        }
    }

    /// Parse the wire form. Returns `None` for unknown modes.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "text-to-image" => Some(GenerationMode::TextToImage),
            "text-to-video" => Some(GenerationMode::TextToVideo),
            "image-to-video" => Some(GenerationMode::ImageToVideo),
            _ => None,
        }
    }

    /// The kind of asset this mode produces.
    pub fn asset_type(&self) -> AssetType {
        match self {
            GenerationMode::TextToImage => AssetType::Image,
            GenerationMode::TextToVideo | GenerationMode::ImageToVideo => AssetType::Video,
        }
    }

    /// Whether a submission in this mode must carry a source image.
    pub fn requires_source_image(&self) -> bool {
        matches!(self, GenerationMode::ImageToVideo)
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AssetType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Image,
    Video,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Image => "IMAGE",
            AssetType::Video => "VIDEO",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Observable lifecycle state of a job.
///
/// `Completed` and `Failed` are terminal: no further transitions are
/// expected once either is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Case-insensitive parse of a wire status. Surrounding whitespace is
    /// ignored; anything outside the four known values yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Locally inferred failure causes written into [`Task::error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Still non-terminal after the pending timeout.
    TimedOut,
    /// Missing from an authoritative batch response (zombie task).
    NotFoundOnServer,
    /// Batch polling failed too many times in a row.
    SyncExhausted,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::TimedOut => "timed out",
            FailureReason::NotFoundOnServer => "not found on server",
            FailureReason::SyncExhausted => "sync exhausted",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One tracked job and its observed lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: JobId,
    pub mode: GenerationMode,
    pub status: TaskStatus,
    /// Client-observed creation instant.
    pub created_at: Timestamp,
    /// Instant of the last applied state change (server time when known).
    pub updated_at: Timestamp,
    /// Consecutive batch poll failures observed for this task.
    #[serde(default)]
    pub retry_count: u32,
    /// `false` once an externally observed terminal transition has not been
    /// acknowledged yet.
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// A freshly submitted task. Self-initiated, so it starts read.
    pub fn new(id: impl Into<JobId>, mode: GenerationMode, status: TaskStatus, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            mode,
            status,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            is_read: true,
            result_url: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(TaskStatus::parse("COMPLETED"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse("completed"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse(" Processing "), Some(TaskStatus::Processing));
        assert_eq!(TaskStatus::parse("failed"), Some(TaskStatus::Failed));
        assert_eq!(TaskStatus::parse("cancelled"), None);
        assert_eq!(TaskStatus::parse(""), None);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn mode_maps_to_asset_type() {
        assert_eq!(GenerationMode::TextToImage.asset_type(), AssetType::Image);
        assert_eq!(GenerationMode::TextToVideo.asset_type(), AssetType::Video);
        assert_eq!(GenerationMode::ImageToVideo.asset_type(), AssetType::Video);
    }

    #[test]
    fn mode_round_trips_through_wire_form() {
        for mode in [
            GenerationMode::TextToImage,
            GenerationMode::TextToVideo,
            GenerationMode::ImageToVideo,
        ] {
            assert_eq!(GenerationMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(GenerationMode::parse("image-to-image"), None);
        assert_eq!(GenerationMode::default(), GenerationMode::TextToImage);
    }

    #[test]
    fn new_task_starts_read_with_equal_timestamps() {
        let now = Utc::now();
        let task = Task::new("job-1", GenerationMode::TextToVideo, TaskStatus::Pending, now);
        assert!(task.is_read);
        assert_eq!(task.created_at, now);
        assert_eq!(task.updated_at, now);
        assert_eq!(task.retry_count, 0);
        assert!(task.result_url.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn task_serializes_with_wire_enum_forms() {
        let task = Task::new("job-1", GenerationMode::ImageToVideo, TaskStatus::Processing, Utc::now());
        let value = serde_json::to_value(&task).expect("task serializes");
        assert_eq!(value["status"], "PROCESSING");
        assert_eq!(value["mode"], "image-to-video");
        assert!(value.get("result_url").is_none());
    }

    #[test]
    fn failure_reasons_are_distinct_strings() {
        assert_eq!(FailureReason::TimedOut.as_str(), "timed out");
        assert_eq!(FailureReason::NotFoundOnServer.as_str(), "not found on server");
        assert_eq!(FailureReason::SyncExhausted.as_str(), "sync exhausted");
    }
}
