use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use yatra_catalog::{Batch, BatchRepository, InventoryManager, PriceQuote, PricingConfig, PricingEngine, PricingInput};
use yatra_core::{Actor, AuditFilter, AuditLogEntry, AuditRepository, NotificationSink};

use crate::cancellation::{CancelRequest, CancellationHandler, CancellationOutcome, CancellationPolicy, RefundOutcome};
use crate::error::{BookingError, BookingResult};
use crate::manager::{BookingManager, ManualPayment, NewBooking, ProofUpload};
use crate::memory::InMemoryLedger;
use crate::models::{Booking, Payment, PaymentStage, Refund};
use crate::reconciliation::{ReconciliationEngine, ReconciliationFilter, ReconciliationReport};
use crate::repository::{BookingFilter, BookingRepository};
use crate::rules::BookingRules;
use crate::verification::{BalanceReminder, PaymentVerifier, ReviewDecision};

/// A bookable departure with its current quote.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOffer {
    pub id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub batch_size: u32,
    pub seats_booked: u32,
    pub available_seats: u32,
    pub status: String,
    pub quote: PriceQuote,
}

/// The one entry point every surface calls. Inventory, lifecycle, review,
/// cancellation and reconciliation invariants are all enforced behind it.
pub struct BookingService {
    inventory: InventoryManager,
    pricing: PricingEngine,
    manager: Arc<BookingManager>,
    verifier: PaymentVerifier,
    cancellations: CancellationHandler,
    audit: Arc<dyn AuditRepository>,
}

impl BookingService {
    pub fn new(
        batches: Arc<dyn BatchRepository>,
        bookings: Arc<dyn BookingRepository>,
        audit: Arc<dyn AuditRepository>,
        notifier: Arc<dyn NotificationSink>,
        rules: BookingRules,
        pricing: PricingConfig,
    ) -> Self {
        let policy = CancellationPolicy::new(rules.late_cancellation_hours);
        let manager = Arc::new(BookingManager::new(bookings, batches.clone(), notifier, rules));
        Self {
            inventory: InventoryManager::new(batches, audit.clone()),
            pricing: PricingEngine::new(pricing),
            verifier: PaymentVerifier::new(manager.clone()),
            cancellations: CancellationHandler::new(manager.clone(), policy),
            manager,
            audit,
        }
    }

    /// Service over a fresh in-memory ledger, which is returned for seeding.
    pub fn in_memory(
        notifier: Arc<dyn NotificationSink>,
        rules: BookingRules,
        pricing: PricingConfig,
    ) -> (Self, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = Self::new(ledger.clone(), ledger.clone(), ledger.clone(), notifier, rules, pricing);
        (service, ledger)
    }

    pub fn inventory(&self) -> &InventoryManager {
        &self.inventory
    }

    pub fn rules(&self) -> &BookingRules {
        self.manager.rules()
    }

    /// Advisory quote for one batch. Seats are derived from the counter, not
    /// the cache.
    pub async fn quote(&self, batch_id: Uuid, pickup: Option<&str>, now: DateTime<Utc>) -> BookingResult<PriceQuote> {
        let batch = self.inventory.get_batch(batch_id).await?;
        let trip = self
            .inventory
            .repository()
            .get_trip(batch.trip_id)
            .await?
            .ok_or(BookingError::TripNotFound(batch.trip_id))?;
        Ok(self.quote_batch(&batch, trip.price_for_origin(pickup), now))
    }

    fn quote_batch(&self, batch: &Batch, base_price: i64, now: DateTime<Utc>) -> PriceQuote {
        self.pricing.price(&PricingInput {
            base_price,
            batch_size: batch.batch_size,
            seats_available: batch.remaining(),
            departure: batch.start_date,
            as_of: now,
        })
    }

    /// Active departures of a trip, earliest first, each with its quote.
    pub async fn available_batches(
        &self,
        trip_id: Uuid,
        pickup: Option<&str>,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<BatchOffer>> {
        let trip = self
            .inventory
            .repository()
            .get_trip(trip_id)
            .await?
            .ok_or(BookingError::TripNotFound(trip_id))?;
        let base_price = trip.price_for_origin(pickup);

        let offers = self
            .inventory
            .active_batches(trip_id)
            .await?
            .into_iter()
            .map(|batch| BatchOffer {
                id: batch.id,
                start_date: batch.start_date,
                end_date: batch.end_date,
                batch_size: batch.batch_size,
                seats_booked: batch.seats_booked,
                available_seats: batch.remaining(),
                status: batch.status.as_str().to_string(),
                quote: self.quote_batch(&batch, base_price, now),
            })
            .collect();
        Ok(offers)
    }

    pub async fn create_booking(&self, request: NewBooking, actor: &Actor) -> BookingResult<Booking> {
        self.manager.create_booking(request, actor).await
    }

    pub async fn get_booking(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<Booking> {
        self.manager.get_visible_booking(booking_id, actor).await
    }

    pub async fn payments_for(&self, booking_id: Uuid) -> BookingResult<Vec<Payment>> {
        Ok(self.manager.repository().payments_for(booking_id).await?)
    }

    pub async fn refunds_for(&self, booking_id: Uuid) -> BookingResult<Vec<Refund>> {
        Ok(self.manager.repository().refunds_for(booking_id).await?)
    }

    pub async fn upload_proof(&self, booking_id: Uuid, upload: ProofUpload, actor: &Actor) -> BookingResult<Booking> {
        self.manager.upload_proof(booking_id, upload, actor).await
    }

    pub async fn review(&self, booking_id: Uuid, decision: ReviewDecision, actor: &Actor) -> BookingResult<Booking> {
        self.verifier.review(booking_id, decision, actor).await
    }

    pub async fn verify(
        &self,
        booking_id: Uuid,
        stage: PaymentStage,
        amount: Option<i64>,
        actor: &Actor,
    ) -> BookingResult<Booking> {
        self.verifier.verify(booking_id, stage, amount, actor).await
    }

    pub async fn reject(
        &self,
        booking_id: Uuid,
        stage: PaymentStage,
        reason: &str,
        actor: &Actor,
    ) -> BookingResult<Booking> {
        self.verifier.reject(booking_id, stage, reason, actor).await
    }

    pub async fn balance_reminder(&self, booking_id: Uuid) -> BookingResult<BalanceReminder> {
        self.verifier.balance_reminder(booking_id).await
    }

    pub async fn send_balance_reminder(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<BalanceReminder> {
        self.verifier.send_balance_reminder(booking_id, actor).await
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        request: CancelRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> BookingResult<CancellationOutcome> {
        self.cancellations.cancel(booking_id, request, actor, now).await
    }

    pub async fn process_refund(&self, refund_id: Uuid, actor: &Actor) -> BookingResult<RefundOutcome> {
        self.cancellations.process_refund(refund_id, actor).await
    }

    pub async fn record_manual_payment(
        &self,
        booking_id: Uuid,
        payment: ManualPayment,
        actor: &Actor,
    ) -> BookingResult<Payment> {
        self.manager.record_manual_payment(booking_id, payment, actor).await
    }

    pub async fn soft_delete(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<Booking> {
        self.manager.soft_delete(booking_id, actor).await
    }

    pub async fn hard_delete(&self, booking_id: Uuid, actor: &Actor) -> BookingResult<()> {
        self.manager.hard_delete(booking_id, actor).await
    }

    pub async fn expire_stale(&self, now: DateTime<Utc>) -> BookingResult<Vec<Uuid>> {
        self.manager.expire_stale(now).await
    }

    /// Read-only ledger check. Soft-deleted bookings stay in scope because
    /// their money rows still exist.
    pub async fn reconciliation_report(&self, filter: &ReconciliationFilter) -> BookingResult<ReconciliationReport> {
        let scope = BookingFilter {
            created_from: filter.from,
            created_to: filter.to,
            include_deleted: true,
            ..Default::default()
        };
        let snapshot = self.manager.repository().snapshot(&scope).await?;
        let mismatches = ReconciliationEngine::reconcile(&snapshot, filter);
        info!(
            "Reconciliation checked {} bookings, {} mismatches",
            snapshot.bookings.len(),
            mismatches.len()
        );
        Ok(ReconciliationReport {
            generated_at: Utc::now(),
            bookings_checked: snapshot.bookings.len(),
            mismatches,
        })
    }

    pub async fn audit_trail(&self, filter: &AuditFilter) -> BookingResult<Vec<AuditLogEntry>> {
        Ok(self.audit.list(filter).await?)
    }
}
