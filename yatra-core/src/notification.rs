use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use yatra_shared::NotificationPayload;

/// Outbound messaging seam. Delivery belongs to an external collaborator;
/// the engine calls this only after a transition has committed.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Writes payloads to the trace log. Used when no broker is configured.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            booking_id = %payload.booking_id,
            template = payload.template_kind.as_str(),
            recipient = %payload.recipient_phone,
            "Notification queued"
        );
        Ok(())
    }
}

/// Keeps every payload in memory; handy for local runs and tests.
#[derive(Default, Clone)]
pub struct CapturingNotificationSink {
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
    fail: bool,
}

impl CapturingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every dispatch fails, for exercising best-effort paths.
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for CapturingNotificationSink {
    async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err("messaging collaborator unavailable".into());
        }
        self.sent.lock().await.push(payload.clone());
        Ok(())
    }
}
