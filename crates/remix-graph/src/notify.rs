//! Remix notification sink.
//!
//! Delivery is best effort: the manager logs and drops sink failures, and
//! only dispatches after the graph mutation has committed.

use remix_types::notification::RemixNotification;

/// Failure to hand a notification to the sink.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives "your project was remixed" notifications.
pub trait RemixNotifier: Send + Sync {
    fn notify_remix(&self, notification: &RemixNotification) -> Result<(), NotifyError>;
}
