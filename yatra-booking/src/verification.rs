use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use yatra_core::{Actor, AuditAction, AuditEntityType, AuditLogEntry};
use yatra_shared::{Masked, NotificationPayload, TemplateKind};

use crate::error::{BookingError, BookingResult};
use crate::lifecycle::{BookingEvent, SeatEffect};
use crate::manager::{BookingManager, CommitExtras};
use crate::models::{Booking, BookingState, PaymentStage, PaymentStatus, Payment};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub stage: PaymentStage,
    pub outcome: ReviewOutcome,
    pub reason: Option<String>,
    /// Amount actually received, when it differs from what was expected.
    pub amount: Option<i64>,
}

/// What the messaging collaborator needs to chase an outstanding balance.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReminder {
    pub booking_id: Uuid,
    pub recipient_phone: Masked<String>,
    pub traveller_name: String,
    pub amount_due: i64,
    pub due_date: DateTime<Utc>,
    pub departure: DateTime<Utc>,
}

impl BalanceReminder {
    pub fn to_notification(&self) -> NotificationPayload {
        NotificationPayload::new(self.booking_id, self.recipient_phone.clone(), TemplateKind::BalanceDueReminder)
            .with_value("traveller_name", &self.traveller_name)
            .with_value("amount_due", self.amount_due)
            .with_value("due_date", self.due_date.format("%Y-%m-%d"))
            .with_value("departure_date", self.departure.format("%Y-%m-%d"))
    }
}

/// Staff review of uploaded payment proofs, one stage at a time.
pub struct PaymentVerifier {
    manager: Arc<BookingManager>,
}

impl PaymentVerifier {
    pub fn new(manager: Arc<BookingManager>) -> Self {
        Self { manager }
    }

    pub async fn review(&self, booking_id: Uuid, decision: ReviewDecision, actor: &Actor) -> BookingResult<Booking> {
        match decision.outcome {
            ReviewOutcome::Verified => self.verify(booking_id, decision.stage, decision.amount, actor).await,
            ReviewOutcome::Rejected => {
                let reason = decision.reason.unwrap_or_default();
                self.reject(booking_id, decision.stage, &reason, actor).await
            }
        }
    }

    /// Accept a proof. Advance verification reserves the party's seats in the
    /// same commit; if the batch is full nothing is written.
    pub async fn verify(
        &self,
        booking_id: Uuid,
        stage: PaymentStage,
        amount: Option<i64>,
        actor: &Actor,
    ) -> BookingResult<Booking> {
        ensure_staff(actor)?;

        let event = BookingEvent::ProofVerified { stage, amount };
        let committed = self
            .manager
            .transition(booking_id, &event, |before, t| {
                let credited = t.credited.unwrap_or_default();
                let payment = Payment::verified(
                    booking_id,
                    stage,
                    credited,
                    before.proof(stage).transaction_note.clone(),
                    &actor.id,
                );
                let seats_reserved = match t.seats {
                    SeatEffect::Reserve { seats, .. } => seats,
                    _ => 0,
                };
                let audit = AuditLogEntry::new(
                    actor,
                    match stage {
                        PaymentStage::Advance => AuditAction::AdvanceVerified,
                        PaymentStage::Balance => AuditAction::BalanceVerified,
                    },
                    AuditEntityType::Booking,
                    booking_id,
                    serde_json::json!({
                        "stage": stage.as_str(),
                        "amount": credited,
                        "payment_id": payment.id,
                        "asset_reference": before.proof(stage).asset_reference,
                        "seats_reserved": seats_reserved,
                        "from": before.state.to_string(),
                    }),
                );
                Ok(CommitExtras {
                    payment: Some(payment),
                    audit: Some(audit),
                    ..Default::default()
                })
            })
            .await?;

        let booking = committed.booking;
        info!(
            "Booking {} {} verified by {} (credited {}), now {}",
            booking_id,
            stage,
            actor.id,
            committed.credited.unwrap_or_default(),
            booking.state
        );

        let template = match stage {
            PaymentStage::Advance => TemplateKind::AdvanceVerified,
            PaymentStage::Balance => TemplateKind::BalanceVerified,
        };
        self.manager
            .notify(
                NotificationPayload::new(booking.id, booking.contact.phone.clone(), template)
                    .with_value("traveller_name", &booking.contact.name)
                    .with_value("amount_received", committed.credited.unwrap_or_default())
                    .with_value("balance_due", booking.balance_due()),
            )
            .await;

        Ok(booking)
    }

    /// Send a proof back to the traveller. A reason is mandatory.
    pub async fn reject(
        &self,
        booking_id: Uuid,
        stage: PaymentStage,
        reason: &str,
        actor: &Actor,
    ) -> BookingResult<Booking> {
        ensure_staff(actor)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BookingError::Validation("a rejection reason is required".to_string()));
        }

        let event = BookingEvent::ProofRejected {
            stage,
            reason: reason.to_string(),
        };
        let committed = self
            .manager
            .transition(booking_id, &event, |before, _| {
                Ok(CommitExtras {
                    audit: Some(AuditLogEntry::new(
                        actor,
                        match stage {
                            PaymentStage::Advance => AuditAction::AdvanceRejected,
                            PaymentStage::Balance => AuditAction::BalanceRejected,
                        },
                        AuditEntityType::Booking,
                        booking_id,
                        serde_json::json!({
                            "stage": stage.as_str(),
                            "reason": reason,
                            "asset_reference": before.proof(stage).asset_reference,
                        }),
                    )),
                    ..Default::default()
                })
            })
            .await?;

        let booking = committed.booking;
        info!("Booking {} {} proof rejected by {}: {}", booking_id, stage, actor.id, reason);

        let template = match stage {
            PaymentStage::Advance => TemplateKind::AdvanceRejected,
            PaymentStage::Balance => TemplateKind::BalanceRejected,
        };
        self.manager
            .notify(
                NotificationPayload::new(booking.id, booking.contact.phone.clone(), template)
                    .with_value("traveller_name", &booking.contact.name)
                    .with_value("stage", stage)
                    .with_value("reason", reason),
            )
            .await;

        Ok(booking)
    }

    /// Build the balance-due reminder and hand it to the notification sink.
    pub async fn send_balance_reminder(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<BalanceReminder> {
        ensure_staff(actor)?;
        let reminder = self.balance_reminder(booking_id).await?;
        self.manager.notify(reminder.to_notification()).await;
        info!(
            "Balance reminder for booking {} sent by {}: {} due by {}",
            booking_id,
            actor.id,
            reminder.amount_due,
            reminder.due_date.format("%Y-%m-%d")
        );
        Ok(reminder)
    }

    /// Build the balance-due reminder for a confirmed booking. Nothing is sent.
    pub async fn balance_reminder(&self, booking_id: Uuid) -> BookingResult<BalanceReminder> {
        let booking = self.manager.get_booking(booking_id).await?;
        match booking.state {
            BookingState::Confirmed(PaymentStatus::AdvanceVerified)
            | BookingState::Confirmed(PaymentStatus::BalancePending) => {}
            BookingState::Confirmed(PaymentStatus::FullyPaid) => {
                return Err(BookingError::AlreadySettled {
                    booking_id,
                    stage: PaymentStage::Balance,
                })
            }
            _ => {
                return Err(BookingError::InvalidTransition {
                    from: booking.state.to_string(),
                    event: "balance_reminder".to_string(),
                })
            }
        }

        let batch_id = booking
            .batch_id
            .ok_or_else(|| BookingError::Validation(format!("booking {} has no scheduled departure", booking_id)))?;
        let batch = self
            .manager
            .batches()
            .get_batch(batch_id)
            .await?
            .ok_or(BookingError::BatchNotFound(batch_id))?;

        let due_date = batch.start_date - Duration::days(self.manager.rules().balance_due_days_before_departure);
        Ok(BalanceReminder {
            booking_id,
            recipient_phone: booking.contact.phone.clone(),
            traveller_name: booking.contact.name.clone(),
            amount_due: booking.balance_due(),
            due_date,
            departure: batch.start_date,
        })
    }
}

fn ensure_staff(actor: &Actor) -> BookingResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(BookingError::Forbidden("payment review requires staff".to_string()))
    }
}
