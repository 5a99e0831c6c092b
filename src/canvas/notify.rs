use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

pub const DEFAULT_NOTIFICATION_MS: u64 = 3000;

/// User-facing message for recoverable failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub text: String,
    pub duration_ms: u64,
    pub at: DateTime<Local>,
}

#[derive(Default)]
struct NotifierInner {
    sinks: Mutex<Vec<Sender<Notification>>>,
    log_path: Option<PathBuf>,
}

/// Single channel every recoverable error is reported through. Cloning shares
/// the subscriber list.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("log_path", &self.inner.log_path)
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also appends every notification to `path`, one timestamped line each.
    pub fn with_log_file(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                sinks: Mutex::new(Vec::new()),
                log_path: Some(path.into()),
            }),
        }
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = channel();
        self.inner
            .sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn notify(&self, text: impl Into<String>) {
        self.notify_for(text, DEFAULT_NOTIFICATION_MS);
    }

    pub fn notify_for(&self, text: impl Into<String>, duration_ms: u64) {
        let notification = Notification {
            text: text.into(),
            duration_ms,
            at: Local::now(),
        };
        tracing::info!(text = %notification.text, "notification");
        if let Some(path) = &self.inner.log_path {
            append_notification_log(path, &notification);
        }
        let mut sinks = self
            .inner
            .sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sinks.retain(|tx| tx.send(notification.clone()).is_ok());
    }
}

fn append_notification_log(path: &Path, notification: &Notification) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{} - {}", notification.at.to_rfc3339(), notification.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_notifications() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        notifier.clone().notify_for("Image missing", 1500);
        let received = rx.try_recv().expect("notification");
        assert_eq!(received.text, "Image missing");
        assert_eq!(received.duration_ms, 1500);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let notifier = Notifier::new();
        drop(notifier.subscribe());
        let live = notifier.subscribe();
        notifier.notify("one");
        notifier.notify("two");
        assert_eq!(live.try_iter().count(), 2);
    }

    #[test]
    fn log_file_gets_one_line_per_notification() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("notifications.log");
        let notifier = Notifier::with_log_file(&path);
        notifier.notify("first");
        notifier.notify("second");
        let content = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - first"));
        assert!(lines[1].ends_with(" - second"));
    }
}
