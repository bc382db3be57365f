#![allow(dead_code)]

//! In-memory stand-in for the task service, served by axum on an ephemeral
//! localhost port. Tests drive task transitions through the control methods.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use queuedash::core::{ApiClient, TaskStatus};

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

#[derive(Debug, Clone)]
pub struct FakeTask {
    pub id: String,
    pub file_name: String,
    pub file_size: usize,
    pub status: TaskStatus,
    pub backend: String,
    pub priority: i32,
    pub fields: BTreeMap<String, String>,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub content: Option<String>,
}

fn stamp(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl FakeTask {
    fn to_json(&self) -> Value {
        let mut value = json!({
            "task_id": self.id,
            "file_name": self.file_name,
            "status": self.status.as_str(),
            "backend": self.backend,
            "priority": self.priority,
            "error_message": self.error_message,
            "created_at": stamp(&self.created_at),
            "started_at": self.started_at.as_ref().map(stamp),
            "completed_at": self.completed_at.as_ref().map(stamp),
            "worker_id": self.worker_id,
            "retry_count": 0,
        });
        if let Some(content) = &self.content {
            value["data"] = json!({
                "markdown_file": format!("{}.md", self.file_name),
                "content": content,
                "images_uploaded": false,
                "has_images": false,
            });
        }
        value
    }
}

#[derive(Default)]
struct ServiceState {
    tasks: Vec<FakeTask>,
    next_id: u64,
    unhealthy: bool,
    last_auth: Option<String>,
    last_status_query: Option<(Option<String>, Option<String>)>,
}

#[derive(Clone, Default)]
pub struct FakeService {
    state: Arc<Mutex<ServiceState>>,
}

impl FakeService {
    /// Starts serving and returns the handle plus the base URL.
    pub async fn spawn() -> (Self, String) {
        let service = FakeService::default();
        let app = Router::new()
            .route("/api/v1/tasks/submit", post(submit))
            .route("/api/v1/tasks/:id", get(get_task).delete(cancel_task))
            .route("/api/v1/queue/tasks", get(list_tasks))
            .route("/api/v1/queue/stats", get(stats))
            .route("/api/v1/admin/reset-stale", post(reset_stale))
            .route("/api/v1/admin/cleanup", post(cleanup))
            .route("/api/v1/health", get(health))
            .route("/api/v1/engines", get(engines))
            .with_state(service.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (service, format!("http://{}", addr))
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap()
    }

    fn with_task<R>(&self, id: &str, f: impl FnOnce(&mut FakeTask) -> R) -> R {
        let mut state = self.lock();
        let task = state.tasks.iter_mut().find(|t| t.id == id).unwrap();
        f(task)
    }

    pub fn task(&self, id: &str) -> FakeTask {
        self.with_task(id, |t| t.clone())
    }

    pub fn last_auth(&self) -> Option<String> {
        self.lock().last_auth.clone()
    }

    pub fn last_status_query(&self) -> Option<(Option<String>, Option<String>)> {
        self.lock().last_status_query.clone()
    }

    /// A worker picks the task up.
    pub fn start(&self, id: &str) {
        self.with_task(id, |t| {
            t.status = TaskStatus::Processing;
            t.started_at = Some(now());
            t.worker_id = Some("worker-1".into());
        });
    }

    pub fn complete(&self, id: &str, content: &str) {
        self.with_task(id, |t| {
            t.status = TaskStatus::Completed;
            t.completed_at = Some(now());
            t.content = Some(content.to_string());
        });
    }

    pub fn fail(&self, id: &str, message: &str) {
        self.with_task(id, |t| {
            t.status = TaskStatus::Failed;
            t.completed_at = Some(now());
            t.error_message = Some(message.to_string());
        });
    }

    /// Processing, picked up `minutes` ago by a worker that went away.
    pub fn mark_stale(&self, id: &str, minutes: i64) {
        self.with_task(id, |t| {
            t.status = TaskStatus::Processing;
            t.started_at = Some(now() - chrono::Duration::minutes(minutes));
            t.worker_id = Some("worker-gone".into());
        });
    }

    /// Inserts a finished task that ended `days` ago.
    pub fn add_finished(&self, status: TaskStatus, days: i64) -> String {
        let at = now() - chrono::Duration::days(days);
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("old-{}", state.next_id);
        state.tasks.push(FakeTask {
            id: id.clone(),
            file_name: "archive.pdf".into(),
            file_size: 0,
            status,
            backend: "pipeline".into(),
            priority: 0,
            fields: BTreeMap::new(),
            created_at: at,
            started_at: Some(at),
            completed_at: Some(at),
            worker_id: Some("worker-1".into()),
            error_message: None,
            content: None,
        });
        id
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.lock().unhealthy = unhealthy;
    }

    fn counts(&self) -> Value {
        let state = self.lock();
        let mut counts = serde_json::Map::new();
        for status in TaskStatus::ALL {
            let n = state.tasks.iter().filter(|t| t.status == status).count();
            // the service only reports statuses that have rows
            if n > 0 {
                counts.insert(status.as_str().to_string(), json!(n));
            }
        }
        Value::Object(counts)
    }
}

pub fn client(base_url: &str) -> ApiClient {
    ApiClient::new(base_url, Some("secret".into()), Duration::from_secs(5)).unwrap()
}

fn reject(status: StatusCode, detail: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": detail.into() })))
}

async fn submit(State(svc): State<FakeService>, headers: HeaderMap, mut multipart: Multipart) -> Reply {
    let mut fields = BTreeMap::new();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload.bin").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))?;
            upload = Some((file_name, bytes.len()));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))?;
            fields.insert(name, value);
        }
    }

    let (file_name, file_size) =
        upload.ok_or_else(|| reject(StatusCode::UNPROCESSABLE_ENTITY, "file is required"))?;

    let mut state = svc.lock();
    state.last_auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.next_id += 1;
    let task = FakeTask {
        id: format!("task-{:04}", state.next_id),
        file_name,
        file_size,
        status: TaskStatus::Pending,
        backend: fields.get("backend").cloned().unwrap_or_default(),
        priority: fields.get("priority").and_then(|p| p.parse().ok()).unwrap_or(0),
        fields,
        created_at: now(),
        started_at: None,
        completed_at: None,
        worker_id: None,
        error_message: None,
        content: None,
    };
    let reply = json!({
        "success": true,
        "task_id": task.id,
        "status": "pending",
        "message": "Task submitted successfully",
        "file_name": task.file_name,
        "created_at": stamp(&task.created_at),
    });
    state.tasks.push(task);
    Ok(Json(reply))
}

#[derive(Deserialize)]
struct StatusQuery {
    upload_images: Option<String>,
    format: Option<String>,
}

async fn get_task(
    State(svc): State<FakeService>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Reply {
    let mut state = svc.lock();
    state.last_status_query = Some((query.upload_images, query.format));
    let task = state
        .tasks
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Task not found"))?;
    let mut body = task.to_json();
    body["success"] = json!(true);
    Ok(Json(body))
}

async fn cancel_task(State(svc): State<FakeService>, Path(id): Path<String>) -> Reply {
    let mut state = svc.lock();
    let task = state
        .tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Task not found"))?;
    if task.status.is_terminal() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            format!("Cannot cancel task in {} status", task.status),
        ));
    }
    task.status = TaskStatus::Cancelled;
    task.completed_at = Some(now());
    Ok(Json(json!({ "success": true, "message": "Task cancelled successfully" })))
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_tasks(State(svc): State<FakeService>, Query(query): Query<ListQuery>) -> Reply {
    let state = svc.lock();
    let tasks: Vec<Value> = state
        .tasks
        .iter()
        .filter(|t| query.status.as_deref().map_or(true, |s| t.status.as_str() == s))
        .take(query.limit.unwrap_or(100))
        .map(FakeTask::to_json)
        .collect();
    Ok(Json(json!({
        "success": true,
        "count": tasks.len(),
        "tasks": tasks,
        "can_view_all": true,
    })))
}

async fn stats(State(svc): State<FakeService>) -> Reply {
    let counts = svc.counts();
    let total: u64 = counts
        .as_object()
        .map(|m| m.values().filter_map(Value::as_u64).sum())
        .unwrap_or(0);
    Ok(Json(json!({
        "success": true,
        "stats": counts,
        "total": total,
        "timestamp": stamp(&now()),
    })))
}

#[derive(Deserialize)]
struct ResetQuery {
    timeout_minutes: i64,
}

async fn reset_stale(State(svc): State<FakeService>, Query(query): Query<ResetQuery>) -> Reply {
    let cutoff = now() - chrono::Duration::minutes(query.timeout_minutes);
    let mut state = svc.lock();
    let mut reset = 0;
    for task in state.tasks.iter_mut() {
        if task.status == TaskStatus::Processing && task.started_at.map_or(false, |s| s < cutoff) {
            task.status = TaskStatus::Pending;
            task.started_at = None;
            task.worker_id = None;
            reset += 1;
        }
    }
    Ok(Json(json!({
        "success": true,
        "message": format!("Reset {} stale tasks", reset),
        "reset_count": reset,
    })))
}

#[derive(Deserialize)]
struct CleanupQuery {
    days: i64,
}

async fn cleanup(State(svc): State<FakeService>, Query(query): Query<CleanupQuery>) -> Reply {
    let cutoff = now() - chrono::Duration::days(query.days);
    let mut state = svc.lock();
    let before = state.tasks.len();
    state.tasks.retain(|t| {
        let finished = matches!(t.status, TaskStatus::Completed | TaskStatus::Failed);
        !(finished && t.completed_at.map_or(false, |c| c < cutoff))
    });
    let deleted = before - state.tasks.len();
    Ok(Json(json!({
        "success": true,
        "message": format!("Cleaned up {} old tasks", deleted),
        "deleted_count": deleted,
    })))
}

async fn health(State(svc): State<FakeService>) -> Reply {
    if svc.lock().unhealthy {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": "database unreachable" })),
        ));
    }
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": stamp(&now()),
        "database": "connected",
        "queue_stats": svc.counts(),
    })))
}

async fn engines() -> Json<Value> {
    Json(json!({
        "success": true,
        "engines": {
            "document": [
                {"name": "pipeline", "display_name": "MinerU Pipeline", "supported_formats": [".pdf", ".png"]},
                {"name": "deepseek-ocr", "display_name": "DeepSeek OCR", "supported_formats": [".pdf"]}
            ],
            "audio": [
                {"name": "sensevoice", "display_name": "SenseVoice", "supported_formats": [".wav", ".mp3"]}
            ]
        },
        "timestamp": stamp(&now()),
    }))
}
