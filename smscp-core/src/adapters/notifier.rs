//! Notification senders that do not leave the process

use std::sync::Mutex;

use tracing::info;

use crate::domain::result::{Error, Result};
use crate::ports::NotificationSender;

/// Writes outbound messages to the log instead of delivering them
///
/// Used when no SMS provider is configured, so local installs still see
/// echoes and reset links.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

impl NotificationSender for LogSender {
    fn send(&self, destination: &str, text: &str) -> Result<()> {
        let text = redact_tokens(text);
        info!(destination, text = %text, "outbound message (not delivered)");
        Ok(())
    }
}

/// Replace anything shaped like a compact token (`header.claims.signature`)
/// with a placeholder, keeping the surrounding URL or sentence readable
fn redact_tokens(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            word.split('/')
                .map(|segment| if looks_like_token(segment) { "[redacted]" } else { segment })
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn looks_like_token(segment: &str) -> bool {
    let parts: Vec<&str> = segment.split('.').collect();
    parts.len() == 3
        && parts.iter().all(|part| {
            part.len() >= 8
                && part
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

/// Keeps every sent message in memory
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far as `(destination, text)` pairs
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl NotificationSender for RecordingSender {
    fn send(&self, destination: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| Error::upstream("recording sender lock poisoned"))?
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }
}
