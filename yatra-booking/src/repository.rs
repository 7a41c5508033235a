use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yatra_core::{AuditLogEntry, CoreError};

use crate::error::BookingError;
use crate::lifecycle::SeatEffect;
use crate::models::{Booking, BookingStatus, Payment, Refund};

/// Everything one booking operation writes. Storage applies it all or nothing.
#[derive(Debug, Clone)]
pub struct BookingCommit {
    pub booking: Booking,
    /// `None` inserts a new booking; `Some(v)` updates only if the stored
    /// version is still `v`.
    pub expected_version: Option<i64>,
    pub seats: SeatEffect,
    pub payment: Option<Payment>,
    /// Inserted if new, otherwise overwrites the stored refund with the same id.
    /// A refund already `processed` is immutable (`RefundAlreadyProcessed`).
    pub refund: Option<Refund>,
    pub audit: Option<AuditLogEntry>,
}

impl BookingCommit {
    pub fn insert(booking: Booking) -> Self {
        Self {
            booking,
            expected_version: None,
            seats: SeatEffect::None,
            payment: None,
            refund: None,
            audit: None,
        }
    }

    pub fn update(booking: Booking, expected_version: i64, seats: SeatEffect) -> Self {
        Self {
            booking,
            expected_version: Some(expected_version),
            seats,
            payment: None,
            refund: None,
            audit: None,
        }
    }

    pub fn with_payment(mut self, payment: Payment) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn with_refund(mut self, refund: Refund) -> Self {
        self.refund = Some(refund);
        self
    }

    pub fn with_audit(mut self, audit: AuditLogEntry) -> Self {
        self.audit = Some(audit);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingFilter {
    pub trip_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.trip_id.map_or(true, |id| id == booking.trip_id)
            && self.batch_id.map_or(true, |id| Some(id) == booking.batch_id)
            && self.status.map_or(true, |s| s == booking.booking_status())
            && self.created_from.map_or(true, |from| booking.created_at >= from)
            && self.created_to.map_or(true, |to| booking.created_at <= to)
            && (self.include_deleted || !booking.is_deleted)
    }
}

/// Bookings with their linked money rows, as read by reconciliation.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub bookings: Vec<Booking>,
    pub payments: Vec<Payment>,
    pub refunds: Vec<Refund>,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Apply a commit atomically. A failed seat reservation surfaces as
    /// `SeatsUnavailable`, a stale `expected_version` as `Conflict`; in both
    /// cases nothing was written.
    async fn commit(&self, commit: BookingCommit) -> Result<Booking, BookingError>;

    /// Remove a booking and its payments and refunds, releasing `seats` and
    /// appending `audit` in the same transaction.
    async fn purge(
        &self,
        booking_id: Uuid,
        expected_version: i64,
        seats: SeatEffect,
        audit: AuditLogEntry,
    ) -> Result<(), BookingError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, CoreError>;

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, CoreError>;

    async fn payments_for(&self, booking_id: Uuid) -> Result<Vec<Payment>, CoreError>;

    async fn refunds_for(&self, booking_id: Uuid) -> Result<Vec<Refund>, CoreError>;

    async fn get_refund(&self, id: Uuid) -> Result<Option<Refund>, CoreError>;

    async fn snapshot(&self, filter: &BookingFilter) -> Result<LedgerSnapshot, CoreError>;
}
