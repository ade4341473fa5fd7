//! Append-only diagnostic log for discovery and backend failures

use std::sync::Mutex;

/// Collects warnings that have no other channel to the application.
///
/// Backend failures are deliberately soft at the API surface (empty lists,
/// `false` returns), so the underlying cause is recorded here instead.
/// Lines are timestamped, appended in order and never cleared.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    text: Mutex<String>,
}

impl DiagnosticLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line, also mirrored to the tracing subscriber
    pub fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);

        let line = format!("[{}] {}\n", chrono::Utc::now().to_rfc3339(), message);
        self.text.lock().unwrap().push_str(&line);
    }

    /// The accumulated log text
    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }
}
