pub mod audit;
pub mod identity;
pub mod notification;

pub use audit::{AuditAction, AuditEntityType, AuditFilter, AuditLogEntry, AuditRepository};
pub use identity::{Actor, Role};
pub use notification::{CapturingNotificationSink, LogNotificationSink, NotificationSink};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}
