//! Progress fan-out to live subscribers.

use crate::defaults;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Kind of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Progress,
    Log,
}

/// One progress update, serialized as
/// `{"type":"progress","chapterId":..,"percentage":..,"message":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub chapter_id: String,
    pub percentage: u8,
    pub message: String,
}

impl ProgressMessage {
    pub fn progress(chapter_id: &str, percentage: u8, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Progress,
            chapter_id: chapter_id.to_string(),
            percentage: percentage.min(100),
            message: message.into(),
        }
    }

    /// Failure report: percentage resets to 0 and the message carries the error.
    pub fn error(chapter_id: &str, error: impl std::fmt::Display) -> Self {
        Self::progress(chapter_id, 0, format!("Error: {error}"))
    }

    pub fn log(chapter_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Log,
            chapter_id: chapter_id.to_string(),
            percentage: 0,
            message: message.into(),
        }
    }
}

/// Fire-and-forget publisher with one bounded buffer per subscriber.
///
/// A subscriber whose buffer is full or whose receiver was dropped is removed
/// on the next publish. Publishing never waits on a subscriber.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    subscribers: Arc<Mutex<Vec<Sender<ProgressMessage>>>>,
    buffer: usize,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(defaults::PROGRESS_BUFFER)
    }
}

impl ProgressHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Receiver<ProgressMessage> {
        let (tx, rx) = bounded(self.buffer);
        self.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn publish(&self, message: ProgressMessage) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("dropping slow progress subscriber");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<ProgressMessage>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
