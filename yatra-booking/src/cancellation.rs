use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use yatra_core::{Actor, AuditAction, AuditEntityType, AuditLogEntry};
use yatra_shared::{NotificationPayload, TemplateKind};

use crate::error::{BookingError, BookingResult};
use crate::lifecycle::BookingEvent;
use crate::manager::{released, BookingManager, CommitExtras};
use crate::models::{Booking, Refund, RefundStatus};

/// Late-cancellation guard. Inside the window a cancellation needs explicit
/// confirmation; outside it, or after departure, it does not.
#[derive(Debug, Clone, Copy)]
pub struct CancellationPolicy {
    late_window_hours: i64,
}

impl CancellationPolicy {
    pub fn new(late_window_hours: i64) -> Self {
        Self { late_window_hours }
    }

    pub fn window_hours(&self) -> i64 {
        self.late_window_hours
    }

    pub fn requires_confirmation(&self, departure: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let until = departure - now;
        until > Duration::zero() && until <= Duration::hours(self.late_window_hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
    pub refund_amount: i64,
    /// Staff acknowledgement for cancellations inside the late window.
    /// Ignored when a traveller cancels.
    #[serde(default)]
    pub confirm_late: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub refund: Refund,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub refund: Refund,
    pub booking: Booking,
}

pub struct CancellationHandler {
    manager: Arc<BookingManager>,
    policy: CancellationPolicy,
}

impl CancellationHandler {
    pub fn new(manager: Arc<BookingManager>, policy: CancellationPolicy) -> Self {
        Self { manager, policy }
    }

    /// Cancel a booking. Seat release and the pending refund row go into the
    /// same commit, so a refund never exists for a booking still holding seats.
    ///
    /// The owning traveller may cancel too. Their refund amount is a request
    /// capped at what was paid, and only staff can pay it out or override the
    /// late window.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        request: CancelRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<CancellationOutcome> {
        let by_staff = actor.is_staff();
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(BookingError::Validation("a cancellation reason is required".to_string()));
        }
        if request.refund_amount < 0 {
            return Err(BookingError::Validation("refund amount must not be negative".to_string()));
        }

        let booking = self.manager.get_visible_booking(booking_id, actor).await?;
        if !by_staff && request.refund_amount > booking.amount_paid() {
            return Err(BookingError::Validation(format!(
                "refund request of {} exceeds the {} paid",
                request.refund_amount,
                booking.amount_paid()
            )));
        }

        if let Some(batch_id) = booking.batch_id {
            let batch = self
                .manager
                .batches()
                .get_batch(batch_id)
                .await?
                .ok_or(BookingError::BatchNotFound(batch_id))?;

            if self.policy.requires_confirmation(batch.start_date, now) {
                let hours = batch.hours_until_departure(now);
                if !(request.confirm_late && by_staff) {
                    warn!(
                        "Cancellation of booking {} blocked: departure in {}h, inside {}h window",
                        booking_id, hours, self.policy.late_window_hours
                    );
                    return Err(BookingError::PolicyGuard {
                        hours_to_departure: hours,
                        window_hours: self.policy.late_window_hours,
                    });
                }
                info!(
                    "Late cancellation of booking {} confirmed by {} ({}h to departure)",
                    booking_id, actor.id, hours
                );
            }
        }

        if request.refund_amount > booking.amount_paid() {
            warn!(
                "Refund {} on booking {} exceeds the {} collected",
                request.refund_amount,
                booking_id,
                booking.amount_paid()
            );
        }

        let refund = Refund::pending(booking_id, request.refund_amount, &reason);
        let event = BookingEvent::Cancelled { reason: reason.clone() };
        let committed = self
            .manager
            .transition(booking_id, &event, |before, t| {
                Ok(CommitExtras {
                    refund: Some(refund.clone()),
                    audit: Some(AuditLogEntry::new(
                        actor,
                        AuditAction::BookingCancelled,
                        AuditEntityType::Booking,
                        booking_id,
                        serde_json::json!({
                            "reason": reason,
                            "refund_id": refund.id,
                            "refund_amount": refund.amount,
                            "seats_released": released(t.seats),
                            "confirm_late": request.confirm_late,
                            "from": before.state.to_string(),
                        }),
                    )),
                    ..Default::default()
                })
            })
            .await?;

        let booking = committed.booking;
        info!(
            "Booking {} cancelled by {}: {} seats released, refund {} pending for {}",
            booking_id,
            actor.id,
            released(committed.seats),
            refund.id,
            refund.amount
        );

        self.manager
            .notify(
                NotificationPayload::new(booking.id, booking.contact.phone.clone(), TemplateKind::BookingCancelled)
                    .with_value("traveller_name", &booking.contact.name)
                    .with_value("reason", &reason)
                    .with_value("refund_amount", refund.amount),
            )
            .await;

        Ok(CancellationOutcome { booking, refund })
    }

    /// Mark a pending refund as paid out and flip its booking to `refunded`.
    pub async fn process_refund(&self, refund_id: Uuid, actor: &Actor) -> BookingResult<RefundOutcome> {
        if !actor.is_staff() {
            return Err(BookingError::Forbidden("processing refunds requires staff".to_string()));
        }

        let refund = self
            .manager
            .repository()
            .get_refund(refund_id)
            .await?
            .ok_or(BookingError::RefundNotFound(refund_id))?;
        if refund.status == RefundStatus::Processed {
            return Err(BookingError::RefundAlreadyProcessed(refund_id));
        }

        let mut processed = refund.clone();
        processed.mark_processed(&actor.id);

        let committed = self
            .manager
            .transition(refund.booking_id, &BookingEvent::RefundProcessed, |before, _| {
                Ok(CommitExtras {
                    refund: Some(processed.clone()),
                    audit: Some(AuditLogEntry::new(
                        actor,
                        AuditAction::RefundProcessed,
                        AuditEntityType::Refund,
                        refund_id,
                        serde_json::json!({
                            "booking_id": before.id,
                            "amount": processed.amount,
                            "from": before.state.to_string(),
                        }),
                    )),
                    ..Default::default()
                })
            })
            .await?;

        let booking = committed.booking;
        info!("Refund {} of {} processed by {}", refund_id, processed.amount, actor.id);

        self.manager
            .notify(
                NotificationPayload::new(booking.id, booking.contact.phone.clone(), TemplateKind::RefundProcessed)
                    .with_value("traveller_name", &booking.contact.name)
                    .with_value("refund_amount", processed.amount),
            )
            .await;

        Ok(RefundOutcome {
            refund: processed,
            booking,
        })
    }
}
