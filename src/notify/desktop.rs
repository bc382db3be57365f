use std::thread;

use notify_rust::{Notification, Timeout};
use tracing::debug;

use super::{Notifier, Toast, ToastKind};

const APP_NAME: &str = "queuedash";

/// Desktop popups. Each toast is shown from its own detached thread, so a
/// slow or missing notification daemon never stalls the caller.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    min_kind: ToastKind,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            min_kind: ToastKind::Success,
        }
    }
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only popup for failures.
    pub fn errors_only() -> Self {
        Self {
            min_kind: ToastKind::Error,
        }
    }

    fn accepts(&self, kind: ToastKind) -> bool {
        match self.min_kind {
            ToastKind::Error => matches!(kind, ToastKind::Error),
            ToastKind::Warning => matches!(kind, ToastKind::Error | ToastKind::Warning),
            _ => kind != ToastKind::Info,
        }
    }
}

fn summary(kind: ToastKind) -> &'static str {
    match kind {
        ToastKind::Success => "queuedash: done",
        ToastKind::Error => "queuedash: error",
        ToastKind::Warning => "queuedash: warning",
        ToastKind::Info => "queuedash",
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, toast: &Toast) {
        if !self.accepts(toast.kind) {
            return;
        }
        let kind = toast.kind;
        let body = toast.message.clone();
        let timeout = Timeout::Milliseconds(toast.duration.as_millis().min(u32::MAX as u128) as u32);

        thread::spawn(move || {
            let shown = Notification::new()
                .appname(APP_NAME)
                .summary(summary(kind))
                .body(&body)
                .timeout(timeout)
                .show();
            if let Err(err) = shown {
                debug!(error = %err, "Desktop notification unavailable");
            }
        });
    }
}
