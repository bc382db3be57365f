use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// A task in a terminal status will not change again on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Result payload attached to a finished task. Which fields are present
/// depends on the `format` the status was requested with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub markdown_file: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub images_uploaded: bool,
    #[serde(default)]
    pub has_images: Option<bool>,
    #[serde(default)]
    pub json_available: Option<bool>,
    #[serde(default)]
    pub json_file: Option<String>,
    #[serde(default)]
    pub json_content: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(default)]
    pub file_name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub result_path: Option<String>,
    #[serde(default)]
    pub data: Option<TaskData>,
}

impl Task {
    pub fn created(&self) -> Option<NaiveDateTime> {
        parse_server_time(&self.created_at)
    }

    pub fn started(&self) -> Option<NaiveDateTime> {
        self.started_at.as_deref().and_then(parse_server_time)
    }

    pub fn completed(&self) -> Option<NaiveDateTime> {
        self.completed_at.as_deref().and_then(parse_server_time)
    }

    /// Wall-clock processing time, when the server reported both ends.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed()? - self.started()?)
    }

    /// Markdown content, if the payload carries any.
    pub fn content(&self) -> Option<&str> {
        self.data.as_ref()?.content.as_deref()
    }

    /// Describes the first disagreement between `status` and the optional
    /// timestamps/error fields. The server owns task state, so callers only
    /// report these; nothing is rejected.
    pub fn inconsistency(&self) -> Option<String> {
        if self.error_message.is_some() && self.status != TaskStatus::Failed {
            return Some(format!(
                "error_message set on a task in status {}",
                self.status
            ));
        }
        match self.status {
            TaskStatus::Pending if self.completed_at.is_some() => {
                Some("pending task has completed_at".to_string())
            }
            TaskStatus::Processing if self.started_at.is_none() => {
                Some("processing task has no started_at".to_string())
            }
            TaskStatus::Processing if self.completed_at.is_some() => {
                Some("processing task has completed_at".to_string())
            }
            TaskStatus::Completed if self.completed_at.is_none() => {
                Some("completed task has no completed_at".to_string())
            }
            _ => None,
        }
    }
}

/// Accepts the timestamp shapes the task service emits: ISO-8601 with or
/// without offset and fractional seconds, and SQLite's `YYYY-MM-DD HH:MM:SS`.
pub fn parse_server_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Counters as they arrive on the wire. Any key may be missing or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsCounts {
    #[serde(default)]
    pub pending: Option<u64>,
    #[serde(default)]
    pub processing: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub cancelled: Option<u64>,
}

/// Queue counters with every status materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl QueueStats {
    pub fn get(&self, status: TaskStatus) -> u64 {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Processing => self.processing,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> u64 {
        TaskStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

impl From<&StatsCounts> for QueueStats {
    fn from(raw: &StatsCounts) -> Self {
        Self {
            pending: raw.pending.unwrap_or(0),
            processing: raw.processing.unwrap_or(0),
            completed: raw.completed.unwrap_or(0),
            failed: raw.failed.unwrap_or(0),
            cancelled: raw.cancelled.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub stats: StatsCounts,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl StatsResponse {
    pub fn normalized(&self) -> QueueStats {
        QueueStats::from(&self.stats)
    }

    /// Server-reported total, or the sum of the normalized counters when absent.
    pub fn total(&self) -> u64 {
        self.total.unwrap_or_else(|| self.normalized().total())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: bool,
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(flatten)]
    pub task: Task,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub can_view_all: Option<bool>,
}

/// Generic acknowledgment. Endpoint-specific counters (`reset_count`,
/// `deleted_count`, ...) land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiResponse {
    pub fn count(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(Value::as_u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub queue_stats: Option<StatsCounts>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub supported_formats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub engines: BTreeMap<String, Vec<EngineInfo>>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in TaskStatus::ALL {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, json!(status.as_str()));
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("Canceled".parse::<TaskStatus>().unwrap(), TaskStatus::Cancelled);
        assert!("running".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn stats_missing_and_null_counters_become_zero() {
        let resp: StatsResponse = serde_json::from_value(json!({
            "success": true,
            "stats": {"pending": 3, "failed": null},
            "timestamp": "2024-05-01T10:00:00.123456"
        }))
        .unwrap();

        let stats = resp.normalized();
        assert_eq!(
            stats,
            QueueStats {
                pending: 3,
                processing: 0,
                completed: 0,
                failed: 0,
                cancelled: 0,
            }
        );
        assert_eq!(resp.total(), 3);
    }

    #[test]
    fn server_total_wins_over_derived_total() {
        let resp: StatsResponse = serde_json::from_value(json!({
            "success": true,
            "stats": {"pending": 1, "completed": 2},
            "total": 10
        }))
        .unwrap();
        assert_eq!(resp.total(), 10);
        assert_eq!(resp.normalized().total(), 3);
    }

    #[test]
    fn task_status_response_tolerates_sparse_payload() {
        let resp: TaskStatusResponse = serde_json::from_value(json!({
            "success": true,
            "task_id": "abc123",
            "status": "completed",
            "created_at": "2024-05-01 10:00:00",
            "data": {"markdown_file": "doc.md", "content": "# Title", "images_uploaded": false},
            "message": null
        }))
        .unwrap();

        assert_eq!(resp.task.task_id, "abc123");
        assert_eq!(resp.task.status, TaskStatus::Completed);
        assert_eq!(resp.task.retry_count, 0);
        assert_eq!(resp.task.content(), Some("# Title"));
        assert!(resp.message.is_none());
    }

    #[test]
    fn inconsistent_tasks_are_reported_not_rejected() {
        let task: Task = serde_json::from_value(json!({
            "task_id": "t1",
            "file_name": "a.pdf",
            "status": "completed",
            "backend": "pipeline",
            "created_at": "2024-05-01T10:00:00",
            "error_message": "worker crashed"
        }))
        .unwrap();

        let issue = task.inconsistency().unwrap();
        assert!(issue.contains("error_message"));
    }

    #[test]
    fn consistent_failed_task_has_no_issue() {
        let task: Task = serde_json::from_value(json!({
            "task_id": "t2",
            "status": "failed",
            "created_at": "2024-05-01T10:00:00",
            "started_at": "2024-05-01T10:00:05",
            "completed_at": "2024-05-01T10:01:05",
            "error_message": "bad pdf"
        }))
        .unwrap();

        assert!(task.inconsistency().is_none());
        assert_eq!(task.duration(), Some(chrono::Duration::seconds(60)));
    }

    #[test]
    fn parses_server_timestamp_shapes() {
        assert!(parse_server_time("2024-05-01T10:00:00.123456").is_some());
        assert!(parse_server_time("2024-05-01T10:00:00+08:00").is_some());
        assert!(parse_server_time("2024-05-01 10:00:00").is_some());
        assert!(parse_server_time("").is_none());
        assert!(parse_server_time("yesterday").is_none());
    }

    #[test]
    fn api_response_keeps_endpoint_counters() {
        let resp: ApiResponse = serde_json::from_value(json!({
            "success": true,
            "reset_count": 2,
            "message": "Reset tasks processing for more than 30 minutes"
        }))
        .unwrap();
        assert_eq!(resp.count("reset_count"), Some(2));
        assert_eq!(resp.count("deleted_count"), None);
    }
}
