use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Actor, CoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AdvanceVerified,
    AdvanceRejected,
    BalanceVerified,
    BalanceRejected,
    BookingCancelled,
    RefundProcessed,
    ManualPaymentRecorded,
    BookingSoftDeleted,
    BookingHardDeleted,
    BookingExpired,
    SeatsOverridden,
    BatchStatusChanged,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityType {
    Booking,
    Batch,
    Refund,
    Payment,
}

/// Immutable record of a privileged action. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: Uuid,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Uuid,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: actor.id.clone(),
            action,
            entity_type,
            entity_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub entity_type: Option<AuditEntityType>,
    pub entity_id: Option<Uuid>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.entity_type.map_or(true, |t| t == entry.entity_type)
            && self.entity_id.map_or(true, |id| id == entry.entity_id)
    }
}

/// Audit trail storage. Writes are fire-and-forget from the engine's
/// perspective except where an entry is bundled into a booking commit.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), CoreError>;

    /// Entries matching the filter, newest first.
    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, CoreError>;
}
