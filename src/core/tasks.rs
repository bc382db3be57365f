use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::client::ApiClient;
use crate::core::error::ApiError;
use crate::core::task::{
    ApiResponse, EnginesResponse, SubmitResponse, TaskListResponse, TaskStatus, TaskStatusResponse,
};

pub const DEFAULT_LANG: &str = "ch";
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Processing engine a task is routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    Auto,
    #[default]
    Pipeline,
    VlmTransformers,
    VlmVllmEngine,
    DeepseekOcr,
    PaddleocrVl,
    Sensevoice,
    Video,
    Fasta,
    Genbank,
}

impl Backend {
    pub const ALL: [Backend; 10] = [
        Backend::Auto,
        Backend::Pipeline,
        Backend::VlmTransformers,
        Backend::VlmVllmEngine,
        Backend::DeepseekOcr,
        Backend::PaddleocrVl,
        Backend::Sensevoice,
        Backend::Video,
        Backend::Fasta,
        Backend::Genbank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::Pipeline => "pipeline",
            Backend::VlmTransformers => "vlm-transformers",
            Backend::VlmVllmEngine => "vlm-vllm-engine",
            Backend::DeepseekOcr => "deepseek-ocr",
            Backend::PaddleocrVl => "paddleocr-vl",
            Backend::Sensevoice => "sensevoice",
            Backend::Video => "video",
            Backend::Fasta => "fasta",
            Backend::Genbank => "genbank",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    #[default]
    Auto,
    /// Use the embedded text layer.
    #[value(alias = "text")]
    Txt,
    Ocr,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::Auto => "auto",
            ParseMethod::Txt => "txt",
            ParseMethod::Ocr => "ocr",
        }
    }
}

/// Which result representation `get_status` embeds in the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    #[default]
    Markdown,
    Json,
    Both,
}

impl ResultFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormat::Markdown => "markdown",
            ResultFormat::Json => "json",
            ResultFormat::Both => "both",
        }
    }
}

/// Options for a submission. `None` means "use the documented default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    pub backend: Option<Backend>,
    pub lang: Option<String>,
    pub method: Option<ParseMethod>,
    pub formula_enable: Option<bool>,
    pub table_enable: Option<bool>,
    pub priority: Option<i32>,
    /// Backend specific fields (`deepseek_resolution`, `remove_watermark`, ...),
    /// sent verbatim.
    pub extra: BTreeMap<String, String>,
}

impl SubmitOptions {
    pub fn with_extra(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra.insert(key.into(), value.to_string());
        self
    }

    pub fn deepseek(self, resolution: &str, prompt_type: &str) -> Self {
        self.with_extra("deepseek_resolution", resolution)
            .with_extra("deepseek_prompt_type", prompt_type)
    }

    pub fn watermark_removal(self, conf_threshold: f32, dilation: u32) -> Self {
        self.with_extra("remove_watermark", true)
            .with_extra("watermark_conf_threshold", conf_threshold)
            .with_extra("watermark_dilation", dilation)
    }

    /// Text fields of the multipart body, defaults resolved, in wire order.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("backend".to_string(), self.backend.unwrap_or_default().to_string()),
            (
                "lang".to_string(),
                self.lang
                    .as_deref()
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or(DEFAULT_LANG)
                    .to_string(),
            ),
            ("method".to_string(), self.method.unwrap_or_default().as_str().to_string()),
            ("formula_enable".to_string(), self.formula_enable.unwrap_or(true).to_string()),
            ("table_enable".to_string(), self.table_enable.unwrap_or(true).to_string()),
            ("priority".to_string(), self.priority.unwrap_or(0).to_string()),
        ];
        for (key, value) in &self.extra {
            if fields.iter().any(|(k, _)| k == key) {
                warn!(field = %key, "Ignoring extra field that shadows a standard option");
                continue;
            }
            fields.push((key.clone(), value.clone()));
        }
        fields
    }
}

/// A file to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, ApiError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::Request(format!("not a file path: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| ApiError::Request(format!("cannot read {}: {}", path.display(), err)))?;
        Ok(Self { file_name, bytes })
    }
}

/// Typed operations on individual tasks.
#[derive(Debug, Clone)]
pub struct TaskApi {
    client: ApiClient,
}

impl TaskApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn submit(&self, file: FileUpload, options: &SubmitOptions) -> Result<SubmitResponse, ApiError> {
        let size = file.bytes.len();
        let mut form = Form::new().part("file", Part::bytes(file.bytes).file_name(file.file_name.clone()));
        for (key, value) in options.form_fields() {
            form = form.text(key, value);
        }

        let builder = self.client.request(Method::POST, &["tasks", "submit"])?.multipart(form);
        let resp: SubmitResponse = self.client.send_json(builder).await?;
        info!(task_id = %resp.task_id, file = %file.file_name, bytes = size, "Task submitted");
        Ok(resp)
    }

    /// Current state of a task. With `upload_images` the service uploads
    /// result images as a side effect, so repeated calls are not idempotent.
    pub async fn get_status(
        &self,
        task_id: &str,
        upload_images: bool,
        format: ResultFormat,
    ) -> Result<TaskStatusResponse, ApiError> {
        let builder = self
            .client
            .request(Method::GET, &["tasks", task_id])?
            .query(&[("upload_images", upload_images.to_string()), ("format", format.as_str().to_string())]);
        let resp: TaskStatusResponse = self.client.send_json(builder).await?;
        if let Some(issue) = resp.task.inconsistency() {
            warn!(task_id = %resp.task.task_id, %issue, "Task state is inconsistent");
        }
        Ok(resp)
    }

    /// Asks the service to cancel. Success means the request was accepted,
    /// not that processing stopped.
    pub async fn cancel(&self, task_id: &str) -> Result<ApiResponse, ApiError> {
        let builder = self.client.request(Method::DELETE, &["tasks", task_id])?;
        let resp: ApiResponse = self.client.send_json(builder).await?;
        info!(%task_id, success = resp.success, "Cancellation requested");
        Ok(resp)
    }

    pub async fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<TaskListResponse, ApiError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        let builder = self.client.request(Method::GET, &["queue", "tasks"])?.query(&query);
        self.client.send_json(builder).await
    }

    pub async fn engines(&self) -> Result<EnginesResponse, ApiError> {
        let builder = self.client.request(Method::GET, &["engines"])?;
        self.client.send_json(builder).await
    }

    /// Polls until the task reaches a terminal status. `on_poll` sees every
    /// response, the final one included. The first failure is returned as is.
    pub async fn wait_for_completion<F>(
        &self,
        task_id: &str,
        interval: Duration,
        format: ResultFormat,
        mut on_poll: F,
    ) -> Result<TaskStatusResponse, ApiError>
    where
        F: FnMut(&TaskStatusResponse),
    {
        loop {
            let resp = self.get_status(task_id, false, format).await?;
            on_poll(&resp);
            if resp.task.status.is_terminal() {
                return Ok(resp);
            }
            debug!(%task_id, status = %resp.task.status, "Task still running");
            tokio::time::sleep(interval).await;
        }
    }
}
