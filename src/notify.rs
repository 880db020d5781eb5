// 🔔 Notifications + error reporting
//
// The gateway never talks to a global logger or telemetry client. It is
// handed a Notifier (user-facing toasts) and an ErrorReporter (telemetry
// sink) when it is built.

use crate::error::{ErrorCategory, ServiceError};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// One toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Warning,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

pub trait ErrorReporter: Send + Sync {
    /// `context` names the operation, e.g. "create contact"
    fn capture(&self, error: &ServiceError, context: &str);
}

// ============================================================================
// TRACING-BACKED DEFAULTS
// ============================================================================

/// Writes notices to the log; used where there is no UI to show them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Warning => tracing::warn!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Error => tracing::error!(title = %notice.title, "{}", notice.message),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn capture(&self, error: &ServiceError, context: &str) {
        tracing::error!(
            category = %error.category,
            details = ?error.details,
            context,
            "{}",
            error.message
        );
    }
}

// ============================================================================
// RECORDING IMPLEMENTATIONS
// ============================================================================

/// Keeps every notice; handy for embedding and for tests
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices().pop()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    captured: Mutex<Vec<(ErrorCategory, String)>>,
}

impl RecordingReporter {
    /// (category, context) pairs in capture order
    pub fn captured(&self) -> Vec<(ErrorCategory, String)> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn capture(&self, error: &ServiceError, context: &str) {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((error.category, context.to_string()));
    }
}
