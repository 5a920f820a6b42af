use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::backend::ProgressSink;
use crate::busy::lock;

pub const TOAST_LIFETIME: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub id: String,
    pub message: String,
    pub severity: Severity,
}

/// Active notices. Each toast schedules its own removal [`TOAST_LIFETIME`]
/// after creation; a manual dismissal in between leaves that removal a no-op.
#[derive(Debug, Clone, Default)]
pub struct ToastCenter {
    active: Arc<Mutex<Vec<Toast>>>,
    echo: bool,
}

impl ToastCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also prints every toast to stderr as it is pushed.
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn push(&self, message: impl Into<String>, severity: Severity) -> String {
        let toast = Toast {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
            severity,
        };
        if self.echo {
            let tag = match severity {
                Severity::Info => "info",
                Severity::Success => "ok",
                Severity::Error => "error",
            };
            eprintln!("[{tag}] {}", toast.message);
        }
        let id = toast.id.clone();
        lock(&self.active).push(toast);

        // outside a runtime there is nothing to expire against
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let active = Arc::clone(&self.active);
            let expired = id.clone();
            handle.spawn(async move {
                tokio::time::sleep(TOAST_LIFETIME).await;
                lock(&active).retain(|toast| toast.id != expired);
            });
        }
        id
    }

    pub fn info(&self, message: impl Into<String>) -> String {
        self.push(message, Severity::Info)
    }

    pub fn success(&self, message: impl Into<String>) -> String {
        self.push(message, Severity::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> String {
        self.push(message, Severity::Error)
    }

    pub fn dismiss(&self, id: &str) {
        lock(&self.active).retain(|toast| toast.id != id);
    }

    pub fn active(&self) -> Vec<Toast> {
        lock(&self.active).clone()
    }

    pub fn messages(&self, severity: Severity) -> Vec<String> {
        lock(&self.active)
            .iter()
            .filter(|toast| toast.severity == severity)
            .map(|toast| toast.message.clone())
            .collect()
    }
}

impl ProgressSink for ToastCenter {
    fn progress(&self, message: &str) {
        self.info(message);
    }
}
