use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use yatra_catalog::BatchRepository;
use yatra_core::{Actor, AuditAction, AuditEntityType, AuditLogEntry, NotificationSink, Role};
use yatra_shared::{NotificationPayload, TemplateKind};

use crate::error::{BookingError, BookingResult};
use crate::lifecycle::{self, BookingEvent, SeatEffect, Transition};
use crate::models::{Booking, BookingStatus, ContactInfo, Payment, PaymentMethod, PaymentStage, Refund};
use crate::repository::{BookingCommit, BookingFilter, BookingRepository};
use crate::rules::BookingRules;

/// Attempts per operation before a lost compare-and-swap is reported.
const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub trip_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub traveller_count: u32,
    pub total_amount: i64,
    pub pickup_location: Option<String>,
    pub contact: ContactInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofUpload {
    pub stage: PaymentStage,
    pub asset_reference: String,
    pub claimed_amount: Option<i64>,
    pub transaction_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualPayment {
    pub amount: i64,
    pub method: PaymentMethod,
    pub external_transaction_id: Option<String>,
}

/// Rows written alongside a transition.
#[derive(Debug, Default)]
pub(crate) struct CommitExtras {
    pub payment: Option<Payment>,
    pub refund: Option<Refund>,
    pub audit: Option<AuditLogEntry>,
}

/// A transition that made it to storage.
#[derive(Debug, Clone)]
pub(crate) struct Committed {
    pub before: Booking,
    pub booking: Booking,
    pub seats: SeatEffect,
    pub credited: Option<i64>,
}

/// Owns booking creation and drives every state change through the
/// lifecycle table and a single atomic commit.
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    batches: Arc<dyn BatchRepository>,
    notifier: Arc<dyn NotificationSink>,
    rules: BookingRules,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        batches: Arc<dyn BatchRepository>,
        notifier: Arc<dyn NotificationSink>,
        rules: BookingRules,
    ) -> Self {
        Self {
            bookings,
            batches,
            notifier,
            rules,
        }
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    pub fn repository(&self) -> &Arc<dyn BookingRepository> {
        &self.bookings
    }

    pub(crate) fn batches(&self) -> &Arc<dyn BatchRepository> {
        &self.batches
    }

    /// Create a booking in `initiated`. No seats are held until the advance
    /// is verified.
    pub async fn create_booking(&self, request: NewBooking, actor: &Actor) -> BookingResult<Booking> {
        if request.traveller_count == 0 {
            return Err(BookingError::Validation("traveller_count must be at least 1".to_string()));
        }
        if request.total_amount < 0 {
            return Err(BookingError::Validation("total_amount must not be negative".to_string()));
        }
        if request.contact.phone.expose().trim().is_empty() {
            return Err(BookingError::Validation("contact phone is required".to_string()));
        }

        let trip = self
            .batches
            .get_trip(request.trip_id)
            .await?
            .ok_or(BookingError::TripNotFound(request.trip_id))?;
        if !trip.accepts_bookings() {
            return Err(BookingError::Validation(format!("trip {} is not open for booking", trip.id)));
        }

        if let Some(batch_id) = request.batch_id {
            let batch = self
                .batches
                .get_batch(batch_id)
                .await?
                .ok_or(BookingError::BatchNotFound(batch_id))?;
            if batch.trip_id != trip.id {
                return Err(BookingError::Validation(format!(
                    "batch {} does not belong to trip {}",
                    batch_id, trip.id
                )));
            }
            if !batch.is_active() {
                return Err(BookingError::BatchNotActive(batch_id));
            }
            // Advisory only; the binding check happens at advance verification.
            if batch.remaining() < request.traveller_count {
                return Err(BookingError::SeatsUnavailable {
                    batch_id,
                    requested: request.traveller_count,
                    available: batch.remaining(),
                });
            }
        }

        let mut booking = Booking::new(
            request.trip_id,
            request.batch_id,
            actor.id.clone(),
            request.traveller_count,
            request.total_amount,
            self.rules.advance_due(request.total_amount),
            request.contact,
        );
        booking.pickup_location = request
            .pickup_location
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let booking = self.bookings.commit(BookingCommit::insert(booking)).await?;
        info!(
            "Booking {} created for trip {} ({} travellers, total {})",
            booking.id, booking.trip_id, booking.traveller_count, booking.total_amount
        );

        self.notify(
            NotificationPayload::new(booking.id, booking.contact.phone.clone(), TemplateKind::BookingReceived)
                .with_value("traveller_name", &booking.contact.name)
                .with_value("total_amount", booking.total_amount)
                .with_value("advance_due", booking.advance_due),
        )
        .await;

        Ok(booking)
    }

    /// Staff view: includes soft-deleted bookings.
    pub async fn get_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    /// Traveller-facing read. Soft-deleted bookings do not exist here, and a
    /// traveller only sees their own.
    pub async fn get_visible_booking(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<Booking> {
        let booking = self.get_booking(booking_id).await?;
        if booking.is_deleted && !actor.is_staff() {
            return Err(BookingError::NotFound(booking_id));
        }
        ensure_owner(&booking, actor)?;
        Ok(booking)
    }

    pub async fn upload_proof(
        &self,
        booking_id: Uuid,
        upload: ProofUpload,
        actor: &Actor,
    ) -> BookingResult<Booking> {
        let current = self.get_booking(booking_id).await?;
        if current.is_deleted && !actor.is_staff() {
            return Err(BookingError::NotFound(booking_id));
        }
        ensure_owner(&current, actor)?;

        let event = BookingEvent::ProofUploaded {
            stage: upload.stage,
            asset_reference: upload.asset_reference,
            claimed_amount: upload.claimed_amount,
            transaction_note: upload.transaction_note,
        };
        let committed = self
            .transition(booking_id, &event, |_, _| Ok(CommitExtras::default()))
            .await?;
        info!("Booking {} {} proof uploaded", booking_id, upload.stage);
        Ok(committed.booking)
    }

    /// Load, apply, commit; on a lost compare-and-swap reload and try again.
    ///
    /// `extras` is called once per attempt with the stored booking and the
    /// proposed transition, so rows it builds always match what is committed.
    pub(crate) async fn transition<F>(
        &self,
        booking_id: Uuid,
        event: &BookingEvent,
        extras: F,
    ) -> BookingResult<Committed>
    where
        F: Fn(&Booking, &Transition) -> BookingResult<CommitExtras> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let before = self.get_booking(booking_id).await?;
            let transition = lifecycle::apply(&before, event, Utc::now())?;
            let rows = extras(&before, &transition)?;

            let mut commit = BookingCommit::update(transition.booking.clone(), before.version, transition.seats);
            commit.payment = rows.payment;
            commit.refund = rows.refund;
            commit.audit = rows.audit;

            match self.bookings.commit(commit).await {
                Ok(booking) => {
                    debug!("Booking {} {} -> {} ({})", booking_id, before.state, booking.state, event.name());
                    return Ok(Committed {
                        before,
                        booking,
                        seats: transition.seats,
                        credited: transition.credited,
                    });
                }
                Err(BookingError::Conflict(_)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    debug!("Booking {} changed underneath {}, retrying", booking_id, event.name());
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Staff-recorded payment outside the proof flow. Leaves the booking state
    /// alone; used to correct ledger gaps found by reconciliation.
    pub async fn record_manual_payment(
        &self,
        booking_id: Uuid,
        payment: ManualPayment,
        actor: &Actor,
    ) -> BookingResult<Payment> {
        if !actor.is_staff() {
            return Err(BookingError::Forbidden("recording payments requires staff".to_string()));
        }
        if payment.amount <= 0 {
            return Err(BookingError::Validation("payment amount must be positive".to_string()));
        }

        let row = Payment::recorded(
            booking_id,
            payment.amount,
            payment.method,
            payment.external_transaction_id.clone(),
            &actor.id,
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get_booking(booking_id).await?;
            if current.is_deleted {
                return Err(BookingError::NotFound(booking_id));
            }
            let mut next = current.clone();
            next.version += 1;
            next.updated_at = Utc::now();

            let audit = AuditLogEntry::new(
                actor,
                AuditAction::ManualPaymentRecorded,
                AuditEntityType::Payment,
                row.id,
                serde_json::json!({
                    "booking_id": booking_id,
                    "amount": row.amount,
                    "method": row.method.as_str(),
                    "external_transaction_id": row.external_transaction_id,
                }),
            );
            let commit = BookingCommit::update(next, current.version, SeatEffect::None)
                .with_payment(row.clone())
                .with_audit(audit);

            match self.bookings.commit(commit).await {
                Ok(_) => break,
                Err(BookingError::Conflict(_)) if attempt < MAX_COMMIT_ATTEMPTS => continue,
                Err(e) => return Err(e),
            }
        }

        info!("Manual payment {} of {} recorded on booking {}", row.id, row.amount, booking_id);
        Ok(row)
    }

    /// Hide a booking from travellers. Held seats go back to the batch first.
    pub async fn soft_delete(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<Booking> {
        if !actor.has_at_least(Role::Admin) {
            return Err(BookingError::Forbidden("soft delete requires admin".to_string()));
        }

        let committed = self
            .transition(booking_id, &BookingEvent::SoftDeleted, |before, t| {
                Ok(CommitExtras {
                    audit: Some(AuditLogEntry::new(
                        actor,
                        AuditAction::BookingSoftDeleted,
                        AuditEntityType::Booking,
                        booking_id,
                        serde_json::json!({
                            "previous_state": before.state.to_string(),
                            "seats_released": released(t.seats),
                        }),
                    )),
                    ..Default::default()
                })
            })
            .await?;

        info!(
            "Booking {} soft-deleted by {} ({} seats released)",
            booking_id,
            actor.id,
            released(committed.seats)
        );
        Ok(committed.booking)
    }

    /// Irreversibly remove a booking with its payments and refunds. The audit
    /// entry written here outlives the rows it describes.
    pub async fn hard_delete(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<()> {
        if !actor.has_at_least(Role::SuperAdmin) {
            return Err(BookingError::Forbidden("hard delete requires super admin".to_string()));
        }

        let booking = self.get_booking(booking_id).await?;
        let payments = self.bookings.payments_for(booking_id).await?;
        let refunds = self.bookings.refunds_for(booking_id).await?;

        let seats = match booking.batch_id {
            Some(batch_id) if booking.seats_held > 0 => SeatEffect::Release {
                batch_id,
                seats: booking.seats_held,
            },
            _ => SeatEffect::None,
        };

        let audit = AuditLogEntry::new(
            actor,
            AuditAction::BookingHardDeleted,
            AuditEntityType::Booking,
            booking_id,
            serde_json::json!({
                "trip_id": booking.trip_id,
                "batch_id": booking.batch_id,
                "state": booking.state.to_string(),
                "total_amount": booking.total_amount,
                "amount_paid": booking.amount_paid(),
                "payments_removed": payments.len(),
                "refunds_removed": refunds.len(),
                "seats_released": released(seats),
            }),
        );

        self.bookings
            .purge(booking_id, booking.version, seats, audit)
            .await?;
        warn!(
            "Booking {} hard-deleted by {} with {} payments and {} refunds",
            booking_id,
            actor.id,
            payments.len(),
            refunds.len()
        );
        Ok(())
    }

    /// Expire `initiated` bookings that never received an advance proof within
    /// the configured time-to-live. Returns the ids that were expired.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> BookingResult<Vec<Uuid>> {
        let cutoff = now - Duration::hours(self.rules.initiated_ttl_hours);
        let filter = BookingFilter {
            status: Some(BookingStatus::Initiated),
            created_to: Some(cutoff),
            ..Default::default()
        };
        let candidates = self.bookings.list_bookings(&filter).await?;
        let system = Actor::system();

        let mut expired = Vec::new();
        for candidate in candidates {
            let result = self
                .transition(candidate.id, &BookingEvent::Expired, |before, _| {
                    Ok(CommitExtras {
                        audit: Some(AuditLogEntry::new(
                            &system,
                            AuditAction::BookingExpired,
                            AuditEntityType::Booking,
                            before.id,
                            serde_json::json!({ "created_at": before.created_at, "cutoff": cutoff }),
                        )),
                        ..Default::default()
                    })
                })
                .await;

            match result {
                Ok(_) => expired.push(candidate.id),
                // A proof arrived or the booking moved on since it was listed.
                Err(BookingError::InvalidTransition { .. }) | Err(BookingError::Conflict(_)) => {
                    debug!("Booking {} no longer eligible for expiry", candidate.id);
                }
                Err(e) => warn!("Failed to expire booking {}: {}", candidate.id, e),
            }
        }

        if !expired.is_empty() {
            info!("Expired {} stale bookings", expired.len());
        }
        Ok(expired)
    }

    /// Hand a payload to the sink. Delivery failures are logged and dropped;
    /// the transition that triggered them has already committed.
    pub(crate) async fn notify(&self, payload: NotificationPayload) {
        if let Err(e) = self.notifier.dispatch(&payload).await {
            warn!(
                "Notification {} for booking {} to {} failed: {}",
                payload.template_kind.as_str(),
                payload.booking_id,
                payload.recipient_phone,
                e
            );
        }
    }
}

pub(crate) fn released(seats: SeatEffect) -> u32 {
    match seats {
        SeatEffect::Release { seats, .. } => seats,
        _ => 0,
    }
}

fn ensure_owner(booking: &Booking, actor: &Actor) -> BookingResult<()> {
    if actor.is_staff() || booking.traveller_id == actor.id {
        Ok(())
    } else {
        Err(BookingError::Forbidden(format!("booking {} belongs to another traveller", booking.id)))
    }
}
