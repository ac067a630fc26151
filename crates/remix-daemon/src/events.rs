//! Event emission system.
//!
//! Events are broadcast to in-process subscribers. The bus doubles as the
//! remix engine's notification sink: every remix notification becomes a
//! `RemixCreated` event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use remix_graph::{NotifyError, RemixNotifier};
use remix_types::notification::RemixNotification;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "RemixCreated", "DaemonStarted").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl RemixNotifier for EventBus {
    fn notify_remix(&self, notification: &RemixNotification) -> Result<(), NotifyError> {
        let payload = serde_json::to_value(notification)
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        self.emit(Event {
            event_type: "RemixCreated".to_string(),
            timestamp: remix_types::now_secs(),
            payload,
        });
        Ok(())
    }
}
