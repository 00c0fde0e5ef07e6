//! Progress reporting
//!
//! Phases push short status messages into a [`ProgressSink`]. The CLI renders them on a
//! spinner; tests record them or read them back from a channel.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One progress message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProgress {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ServiceProgress {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: ServiceProgress);

    fn message(&self, message: &str) {
        self.report(ServiceProgress::new(message));
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _progress: ServiceProgress) {}
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingProgress {
    messages: Mutex<Vec<ServiceProgress>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.iter().map(|p| p.message.clone()).collect())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, progress: ServiceProgress) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(progress);
        }
    }
}

/// Forwards messages to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<ServiceProgress>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServiceProgress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, progress: ServiceProgress) {
        // the receiver may already be gone
        let _ = self.sender.send(progress);
    }
}

/// Prefixes every message with the service name
pub struct ServiceScopedProgress<'a> {
    inner: &'a dyn ProgressSink,
    service: String,
}

impl<'a> ServiceScopedProgress<'a> {
    pub fn new(inner: &'a dyn ProgressSink, service: impl Into<String>) -> Self {
        Self {
            inner,
            service: service.into(),
        }
    }
}

impl ProgressSink for ServiceScopedProgress<'_> {
    fn report(&self, progress: ServiceProgress) {
        self.inner.report(ServiceProgress {
            message: format!("{}: {}", self.service, progress.message),
            timestamp: progress.timestamp,
        });
    }
}
