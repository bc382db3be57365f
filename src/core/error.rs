use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Where a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The service answered with a non-2xx status, or with a body we could not read.
    Server,
    /// The request went out and no response came back.
    Network,
    /// The request was never sent.
    Local,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Server => f.write_str("API error"),
            FailureKind::Network => f.write_str("Network error"),
            FailureKind::Local => f.write_str("Error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed with status {status}{}", message_suffix(.message))]
    Server {
        status: u16,
        message: Option<String>,
        body: Option<Value>,
    },

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("{0}")]
    Request(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Server { .. } | ApiError::Decode(_) => FailureKind::Server,
            ApiError::Network(_) => FailureKind::Network,
            ApiError::Request(_) => FailureKind::Local,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text fit for a toast or an inline error line: the server's own
    /// message when it sent one, otherwise the error itself.
    pub fn user_message(&self) -> Option<String> {
        let text = match self {
            ApiError::Server {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        };
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// Splits a reqwest failure into "never sent" and "no response".
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ApiError::Request(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err)
        }
    }

    pub(crate) fn from_response_body(status: u16, raw: &str) -> Self {
        let body = serde_json::from_str::<Value>(raw).ok();
        let message = match &body {
            Some(value) => extract_message(value),
            None if !raw.trim().is_empty() => Some(raw.trim().to_string()),
            None => None,
        };
        ApiError::Server {
            status,
            message,
            body,
        }
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {}", m),
        None => String::new(),
    }
}

/// Pulls a human readable message out of an error body. FastAPI puts it in
/// `detail`, which is a list of objects for validation failures.
pub(crate) fn extract_message(body: &Value) -> Option<String> {
    for key in ["detail", "message", "error"] {
        match body.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(Value::Array(items)) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        other => other.get("msg").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect();
                if !parts.is_empty() {
                    return Some(parts.join("; "));
                }
            }
            _ => {}
        }
    }
    None
}
