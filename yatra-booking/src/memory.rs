use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use yatra_catalog::{Batch, BatchRepository, BatchStatus, InventoryError, Trip};
use yatra_core::{AuditFilter, AuditLogEntry, AuditRepository, CoreError};

use crate::error::BookingError;
use crate::lifecycle::SeatEffect;
use crate::models::{Booking, Payment, Refund, RefundStatus};
use crate::repository::{BookingCommit, BookingFilter, BookingRepository, LedgerSnapshot};

#[derive(Default)]
struct LedgerState {
    trips: HashMap<Uuid, Trip>,
    batches: HashMap<Uuid, Batch>,
    bookings: HashMap<Uuid, Booking>,
    payments: Vec<Payment>,
    refunds: HashMap<Uuid, Refund>,
    audit: Vec<AuditLogEntry>,
}

impl LedgerState {
    /// Compute the batch after a seat movement without storing it.
    fn seat_preview(&self, seats: SeatEffect) -> Result<Option<Batch>, BookingError> {
        match seats {
            SeatEffect::None => Ok(None),
            SeatEffect::Reserve { batch_id, seats } => {
                let mut batch = self
                    .batches
                    .get(&batch_id)
                    .cloned()
                    .ok_or(BookingError::BatchNotFound(batch_id))?;
                batch.try_reserve(seats)?;
                Ok(Some(batch))
            }
            SeatEffect::Release { batch_id, seats } => {
                let mut batch = self
                    .batches
                    .get(&batch_id)
                    .cloned()
                    .ok_or(BookingError::BatchNotFound(batch_id))?;
                batch.release(seats);
                Ok(Some(batch))
            }
        }
    }
}

/// The whole ledger behind one lock. Every commit is checked and applied while
/// holding it, which gives the same all-or-nothing semantics as a database
/// transaction. Used by tests and local runs.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchRepository for InMemoryLedger {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, CoreError> {
        Ok(self.state.lock().await.trips.get(&id).cloned())
    }

    async fn save_trip(&self, trip: &Trip) -> Result<(), CoreError> {
        self.state.lock().await.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, CoreError> {
        Ok(self.state.lock().await.batches.get(&id).cloned())
    }

    async fn save_batch(&self, batch: &Batch) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        match state.batches.get_mut(&batch.id) {
            Some(existing) => {
                existing.start_date = batch.start_date;
                existing.end_date = batch.end_date;
                existing.updated_at = batch.updated_at;
            }
            None => {
                state.batches.insert(batch.id, batch.clone());
            }
        }
        Ok(())
    }

    async fn list_batches(&self, trip_id: Uuid) -> Result<Vec<Batch>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .batches
            .values()
            .filter(|b| b.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn reserve_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
        let mut state = self.state.lock().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or(InventoryError::NotFound(batch_id))?;
        batch.try_reserve(count)?;
        Ok(batch.clone())
    }

    async fn release_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
        let mut state = self.state.lock().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or(InventoryError::NotFound(batch_id))?;
        batch.release(count);
        Ok(batch.clone())
    }

    async fn set_seats_booked(&self, batch_id: Uuid, seats_booked: u32) -> Result<Batch, InventoryError> {
        let mut state = self.state.lock().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or(InventoryError::NotFound(batch_id))?;
        batch.override_booked(seats_booked)?;
        Ok(batch.clone())
    }

    async fn set_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<Batch, InventoryError> {
        let mut state = self.state.lock().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or(InventoryError::NotFound(batch_id))?;
        batch.status = status;
        batch.refresh_cache();
        Ok(batch.clone())
    }
}

#[async_trait]
impl BookingRepository for InMemoryLedger {
    async fn commit(&self, commit: BookingCommit) -> Result<Booking, BookingError> {
        let mut state = self.state.lock().await;
        let booking_id = commit.booking.id;

        match (commit.expected_version, state.bookings.get(&booking_id)) {
            (None, Some(_)) => return Err(BookingError::Conflict(booking_id)),
            (Some(_), None) => return Err(BookingError::NotFound(booking_id)),
            (Some(expected), Some(current)) if current.version != expected => {
                return Err(BookingError::Conflict(booking_id))
            }
            _ => {}
        }

        // Everything fallible happens before the first write.
        if let Some(refund) = &commit.refund {
            if let Some(stored) = state.refunds.get(&refund.id) {
                if stored.status == RefundStatus::Processed {
                    return Err(BookingError::RefundAlreadyProcessed(refund.id));
                }
            }
        }
        let batch = state.seat_preview(commit.seats)?;

        if let Some(batch) = batch {
            state.batches.insert(batch.id, batch);
        }
        if let Some(payment) = commit.payment {
            state.payments.push(payment);
        }
        if let Some(refund) = commit.refund {
            state.refunds.insert(refund.id, refund);
        }
        if let Some(entry) = commit.audit {
            state.audit.push(entry);
        }
        state.bookings.insert(booking_id, commit.booking.clone());

        Ok(commit.booking)
    }

    async fn purge(
        &self,
        booking_id: Uuid,
        expected_version: i64,
        seats: SeatEffect,
        audit: AuditLogEntry,
    ) -> Result<(), BookingError> {
        let mut state = self.state.lock().await;
        let current = state
            .bookings
            .get(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;
        if current.version != expected_version {
            return Err(BookingError::Conflict(booking_id));
        }

        let batch = state.seat_preview(seats)?;
        if let Some(batch) = batch {
            state.batches.insert(batch.id, batch);
        }
        state.bookings.remove(&booking_id);
        state.payments.retain(|p| p.booking_id != booking_id);
        state.refunds.retain(|_, r| r.booking_id != booking_id);
        state.audit.push(audit);
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, CoreError> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, CoreError> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    async fn payments_for(&self, booking_id: Uuid) -> Result<Vec<Payment>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn refunds_for(&self, booking_id: Uuid) -> Result<Vec<Refund>, CoreError> {
        let state = self.state.lock().await;
        let mut refunds: Vec<Refund> = state
            .refunds
            .values()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }

    async fn get_refund(&self, id: Uuid) -> Result<Option<Refund>, CoreError> {
        Ok(self.state.lock().await.refunds.get(&id).cloned())
    }

    async fn snapshot(&self, filter: &BookingFilter) -> Result<LedgerSnapshot, CoreError> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);

        let ids: std::collections::HashSet<Uuid> = bookings.iter().map(|b| b.id).collect();
        let payments = state
            .payments
            .iter()
            .filter(|p| ids.contains(&p.booking_id))
            .cloned()
            .collect();
        let refunds = state
            .refunds
            .values()
            .filter(|r| ids.contains(&r.booking_id))
            .cloned()
            .collect();

        Ok(LedgerSnapshot {
            bookings,
            payments,
            refunds,
        })
    }
}

#[async_trait]
impl AuditRepository for InMemoryLedger {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), CoreError> {
        self.state.lock().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactInfo;
    use chrono::{Duration, Utc};
    use yatra_core::{Actor, AuditAction, AuditEntityType};
    use yatra_shared::Masked;

    async fn seeded(size: u32, booked: u32) -> (InMemoryLedger, Batch) {
        let ledger = InMemoryLedger::new();
        let trip = Trip::new("Spiti Circuit", 18_000, size);
        let start = Utc::now() + Duration::days(20);
        let mut batch = Batch::new(trip.id, start, start + Duration::days(7), size);
        batch.override_booked(booked).unwrap();
        ledger.save_trip(&trip).await.unwrap();
        ledger.save_batch(&batch).await.unwrap();
        (ledger, batch)
    }

    fn booking(trip_id: Uuid, batch_id: Uuid) -> Booking {
        let contact = ContactInfo {
            name: "Meera".to_string(),
            phone: Masked::new("9811122233".to_string()),
            email: None,
        };
        Booking::new(trip_id, Some(batch_id), "t-9".to_string(), 2, 20_000, 4_000, contact)
    }

    #[tokio::test]
    async fn test_failed_reservation_writes_nothing() {
        let (ledger, batch) = seeded(10, 9).await;
        let b = booking(batch.trip_id, batch.id);
        ledger.commit(BookingCommit::insert(b.clone())).await.unwrap();

        let mut next = b.clone();
        next.version = 1;
        let entry = AuditLogEntry::new(
            &Actor::system(),
            AuditAction::AdvanceVerified,
            AuditEntityType::Booking,
            b.id,
            serde_json::json!({}),
        );
        let err = ledger
            .commit(
                BookingCommit::update(next, 0, SeatEffect::Reserve { batch_id: batch.id, seats: 2 })
                    .with_payment(Payment::verified(b.id, crate::models::PaymentStage::Advance, 4_000, None, "staff"))
                    .with_audit(entry),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::SeatsUnavailable { requested: 2, available: 1, .. }));
        assert_eq!(ledger.get_booking(b.id).await.unwrap().unwrap().version, 0);
        assert!(ledger.payments_for(b.id).await.unwrap().is_empty());
        assert!(ledger.list(&AuditFilter::default()).await.unwrap().is_empty());
        assert_eq!(ledger.get_batch(batch.id).await.unwrap().unwrap().seats_booked, 9);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let (ledger, batch) = seeded(10, 0).await;
        let b = booking(batch.trip_id, batch.id);
        ledger.commit(BookingCommit::insert(b.clone())).await.unwrap();

        let mut next = b.clone();
        next.version = 1;
        ledger
            .commit(BookingCommit::update(next.clone(), 0, SeatEffect::None))
            .await
            .unwrap();

        let err = ledger
            .commit(BookingCommit::update(next, 0, SeatEffect::None))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let dup = ledger.commit(BookingCommit::insert(b)).await.unwrap_err();
        assert!(matches!(dup, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_purge_removes_money_rows_but_keeps_audit() {
        let (ledger, batch) = seeded(10, 2).await;
        let mut b = booking(batch.trip_id, batch.id);
        b.seats_held = 2;
        ledger
            .commit(
                BookingCommit::insert(b.clone())
                    .with_payment(Payment::verified(b.id, crate::models::PaymentStage::Advance, 4_000, None, "staff"))
                    .with_refund(Refund::pending(b.id, 0, "test")),
            )
            .await
            .unwrap();

        let entry = AuditLogEntry::new(
            &Actor::system(),
            AuditAction::BookingHardDeleted,
            AuditEntityType::Booking,
            b.id,
            serde_json::json!({}),
        );
        ledger
            .purge(b.id, 0, SeatEffect::Release { batch_id: batch.id, seats: 2 }, entry)
            .await
            .unwrap();

        assert!(ledger.get_booking(b.id).await.unwrap().is_none());
        assert!(ledger.payments_for(b.id).await.unwrap().is_empty());
        assert!(ledger.refunds_for(b.id).await.unwrap().is_empty());
        assert_eq!(ledger.get_batch(batch.id).await.unwrap().unwrap().seats_booked, 0);

        let trail = ledger
            .list(&AuditFilter {
                entity_type: Some(AuditEntityType::Booking),
                entity_id: Some(b.id),
            })
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
    }

    #[tokio::test]
    async fn test_save_batch_keeps_seat_counters() {
        let (ledger, batch) = seeded(10, 4).await;
        let mut edited = batch.clone();
        edited.seats_booked = 0;
        edited.end_date = edited.end_date + Duration::days(1);
        ledger.save_batch(&edited).await.unwrap();

        let stored = ledger.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(stored.seats_booked, 4);
        assert_eq!(stored.end_date, edited.end_date);
    }
}
