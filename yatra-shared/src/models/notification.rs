use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::pii::Masked;

/// Message templates the messaging collaborator knows how to render.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    BookingReceived,
    AdvanceVerified,
    AdvanceRejected,
    BalanceVerified,
    BalanceRejected,
    BalanceDueReminder,
    BookingCancelled,
    RefundProcessed,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::BookingReceived => "booking_received",
            TemplateKind::AdvanceVerified => "advance_verified",
            TemplateKind::AdvanceRejected => "advance_rejected",
            TemplateKind::BalanceVerified => "balance_verified",
            TemplateKind::BalanceRejected => "balance_rejected",
            TemplateKind::BalanceDueReminder => "balance_due_reminder",
            TemplateKind::BookingCancelled => "booking_cancelled",
            TemplateKind::RefundProcessed => "refund_processed",
        }
    }
}

/// Outbound message handed to the messaging collaborator. The engine never
/// delivers it itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub booking_id: Uuid,
    pub recipient_phone: Masked<String>,
    pub template_kind: TemplateKind,
    pub substitution_values: BTreeMap<String, String>,
}

impl NotificationPayload {
    pub fn new(booking_id: Uuid, recipient_phone: Masked<String>, template_kind: TemplateKind) -> Self {
        Self {
            booking_id,
            recipient_phone,
            template_kind,
            substitution_values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl ToString) -> Self {
        self.substitution_values.insert(key.to_string(), value.to_string());
        self
    }
}
