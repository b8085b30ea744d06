//! User-visible notices and failure reporting.

use std::fmt;
use std::sync::{Arc, Mutex};

use scripthost_core::ScriptError;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// A short message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Surface for showing notices to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that records every notice and echoes it to the log.
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices shown so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.lock().clone()
    }

    /// Take and clear the recorded notices.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of notices shown at a level.
    pub fn count(&self, level: NoticeLevel) -> usize {
        self.lock().iter().filter(|n| n.level == level).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notice>> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        tracing::info!(target: "scripthost::notice", level = %notice.level, "{}", notice.message);
        self.lock().push(notice);
    }
}

/// Turns failures into exactly one notice plus one error log entry.
#[derive(Clone)]
pub struct Reporter {
    notifier: Arc<dyn Notifier>,
}

impl Reporter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Show an informational notice.
    pub fn info(&self, message: impl Into<String>) {
        self.notifier.notify(Notice::info(message));
    }

    /// Show a warning notice and log it.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.notifier.notify(Notice::warning(message));
    }

    /// Report a failure: the notice carries `context`, the log carries the
    /// full error chain.
    pub fn failure(&self, context: &str, err: &ScriptError) {
        tracing::error!(error = %err, "{context}");
        self.notifier
            .notify(Notice::error(format!("{context}. See log for details.")));
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_log_records() {
        let log = NoticeLog::new();
        log.notify(Notice::info("hello"));
        log.notify(Notice::warning("careful"));

        assert_eq!(log.count(NoticeLevel::Info), 1);
        assert_eq!(log.count(NoticeLevel::Warning), 1);
        assert_eq!(log.drain().len(), 2);
        assert!(log.notices().is_empty());
    }

    #[test]
    fn test_reporter_failure_emits_single_notice() {
        let log = Arc::new(NoticeLog::new());
        let reporter = Reporter::new(log.clone());

        reporter.failure(
            "Error invoking Scripts/a.rhai",
            &ScriptError::callback("Scripts/a.rhai", "boom"),
        );

        let notices = log.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(
            notices[0].message,
            "Error invoking Scripts/a.rhai. See log for details."
        );
    }
}
