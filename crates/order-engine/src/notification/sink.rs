use async_trait::async_trait;

use super::{NotificationEvent, NotifyError};

/// Final destination of a notification drained from the queue.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Writes each notification as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(event).map_err(|e| NotifyError::Rejected(e.to_string()))?;
        tracing::info!(
            topic = event.topic(),
            kind = event.kind(),
            event_id = %event.event_id(),
            order_id = %event.order_id(),
            %payload,
            "notification delivered"
        );
        Ok(())
    }
}
