//! User-facing transient messages. Sinks are fire-and-forget: a sink that
//! cannot show a toast drops it and logs, it never fails the caller.

pub mod desktop;

use std::fmt;
use std::time::Duration;

use colored::*;

use crate::core::error::ApiError;

pub use desktop::DesktopNotifier;

pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

impl fmt::Display for ToastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
            ToastKind::Warning => "warning",
            ToastKind::Info => "info",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub duration: Duration,
}

impl Toast {
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            duration: DEFAULT_TOAST_DURATION,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Info, message)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Error toast for a failed request, prefixed with where it failed
    /// ("API error", "Network error").
    pub fn from_error(err: &ApiError, fallback: &str) -> Self {
        let message = err.user_message().unwrap_or_else(|| fallback.to_string());
        Self::error(format!("{}: {}", err.kind(), message))
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: &Toast);
}

/// Prints toasts to stderr. In quiet mode only warnings and errors get through.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier {
    quiet: bool,
}

impl ConsoleNotifier {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn format(toast: &Toast) -> String {
        let prefix = match toast.kind {
            ToastKind::Success => "[✓]".green(),
            ToastKind::Error => "[✗]".red(),
            ToastKind::Warning => "[!]".yellow(),
            ToastKind::Info => "[*]".blue(),
        };
        format!("{} {}", prefix, toast.message)
    }

    fn suppressed(&self, kind: ToastKind) -> bool {
        self.quiet && matches!(kind, ToastKind::Success | ToastKind::Info)
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, toast: &Toast) {
        if !self.suppressed(toast.kind) {
            eprintln!("{}", Self::format(toast));
        }
    }
}

/// Fans a toast out to every registered sink.
#[derive(Default)]
pub struct NotifierSet {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl Notifier + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn Notifier>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(&Toast::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(&Toast::error(message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(&Toast::warning(message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(&Toast::info(message));
    }
}

impl Notifier for NotifierSet {
    fn notify(&self, toast: &Toast) {
        for sink in &self.sinks {
            sink.notify(toast);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Toast>>>);

    impl Notifier for Recorder {
        fn notify(&self, toast: &Toast) {
            self.0.lock().unwrap().push(toast.clone());
        }
    }

    #[test]
    fn toasts_default_to_three_seconds() {
        let toast = Toast::success("Task submitted");
        assert_eq!(toast.kind, ToastKind::Success);
        assert_eq!(toast.duration, Duration::from_millis(3000));
        assert_eq!(
            Toast::info("x").with_duration(Duration::from_secs(1)).duration,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn error_toast_names_the_failure_kind() {
        let err = ApiError::Server {
            status: 404,
            message: Some("Task not found".into()),
            body: None,
        };
        let toast = Toast::from_error(&err, "Failed to load task");
        assert_eq!(toast.kind, ToastKind::Error);
        assert_eq!(toast.message, "API error: Task not found");

        let toast = Toast::from_error(&ApiError::Request(String::new()), "Failed to load task");
        assert_eq!(toast.message, "Error: Failed to load task");
    }

    #[test]
    fn set_fans_out_to_every_sink() {
        let first = Recorder::default();
        let second = Recorder::default();
        let set = NotifierSet::new().with(first.clone()).with(second.clone());

        set.warning("Queue is backing up");
        set.error("Cleanup failed");

        assert_eq!(set.len(), 2);
        for sink in [first, second] {
            let seen = sink.0.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].kind, ToastKind::Warning);
            assert_eq!(seen[1].message, "Cleanup failed");
        }
    }

    #[test]
    fn quiet_console_keeps_only_problems() {
        let console = ConsoleNotifier::new(true);
        assert!(console.suppressed(ToastKind::Success));
        assert!(console.suppressed(ToastKind::Info));
        assert!(!console.suppressed(ToastKind::Warning));
        assert!(!console.suppressed(ToastKind::Error));
        assert!(!ConsoleNotifier::new(false).suppressed(ToastKind::Info));
    }

    #[test]
    fn console_format_keeps_message() {
        colored::control::set_override(false);
        assert_eq!(
            ConsoleNotifier::format(&Toast::error("Health check failed")),
            "[✗] Health check failed"
        );
    }
}
