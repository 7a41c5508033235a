use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::inventory::InventoryError;

/// A sellable itinerary template. Many batches reference one trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub name: String,
    pub default_price: i64,
    /// Pickup-specific prices, keyed by lower-cased location name.
    pub origin_prices: BTreeMap<String, i64>,
    pub default_capacity: u32,
    pub is_active: bool,
    pub is_bookable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(name: impl Into<String>, default_price: i64, default_capacity: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            default_price,
            origin_prices: BTreeMap::new(),
            default_capacity,
            is_active: true,
            is_bookable: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_origin_price(mut self, origin: &str, price: i64) -> Self {
        self.origin_prices.insert(origin.trim().to_lowercase(), price);
        self
    }

    /// Price for a pickup location, falling back to the default price.
    pub fn price_for_origin(&self, origin: Option<&str>) -> i64 {
        origin
            .map(|o| o.trim().to_lowercase())
            .and_then(|o| self.origin_prices.get(&o).copied())
            .unwrap_or(self.default_price)
    }

    pub fn accepts_bookings(&self) -> bool {
        self.is_active && self.is_bookable
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Closed,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Closed => "closed",
            BatchStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BatchStatus::Active),
            "closed" => Ok(BatchStatus::Closed),
            "completed" => Ok(BatchStatus::Completed),
            other => Err(format!("unknown batch status: {}", other)),
        }
    }
}

/// One scheduled departure of a trip. Owns its seat counters.
///
/// `seats_booked` is authoritative; `available_seats` is a cache that is
/// rewritten after every mutation and never read back for decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub batch_size: u32,
    pub seats_booked: u32,
    pub available_seats: Option<u32>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(trip_id: Uuid, start_date: DateTime<Utc>, end_date: DateTime<Utc>, batch_size: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trip_id,
            start_date,
            end_date,
            batch_size,
            seats_booked: 0,
            available_seats: Some(batch_size),
            status: BatchStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seats still open, derived from the authoritative counter.
    pub fn remaining(&self) -> u32 {
        self.batch_size.saturating_sub(self.seats_booked)
    }

    /// True when the cached counter disagrees with the derived value.
    pub fn cache_is_stale(&self) -> bool {
        self.available_seats != Some(self.remaining())
    }

    pub fn is_active(&self) -> bool {
        self.status == BatchStatus::Active
    }

    pub fn hours_until_departure(&self, now: DateTime<Utc>) -> i64 {
        (self.start_date - now).num_hours()
    }

    /// Check-then-increment. Leaves the batch untouched on failure.
    pub fn try_reserve(&mut self, count: u32) -> Result<(), InventoryError> {
        if count == 0 {
            return Err(InventoryError::InvalidCount("seat count must be positive".to_string()));
        }
        if !self.is_active() {
            return Err(InventoryError::BatchNotActive(self.id));
        }
        let available = self.remaining();
        if available < count {
            return Err(InventoryError::SeatsUnavailable {
                batch_id: self.id,
                requested: count,
                available,
            });
        }
        self.seats_booked += count;
        self.refresh_cache();
        Ok(())
    }

    /// Give seats back. Never drops `seats_booked` below zero.
    pub fn release(&mut self, count: u32) {
        self.seats_booked = self.seats_booked.saturating_sub(count);
        self.refresh_cache();
    }

    /// Staff correction of the booked counter.
    pub fn override_booked(&mut self, seats_booked: u32) -> Result<(), InventoryError> {
        if seats_booked > self.batch_size {
            return Err(InventoryError::InvalidCount(format!(
                "seats_booked {} exceeds batch size {}",
                seats_booked, self.batch_size
            )));
        }
        self.seats_booked = seats_booked;
        self.refresh_cache();
        Ok(())
    }

    pub fn refresh_cache(&mut self) {
        self.available_seats = Some(self.remaining());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch(size: u32, booked: u32) -> Batch {
        let start = Utc::now() + Duration::days(10);
        let mut b = Batch::new(Uuid::new_v4(), start, start + Duration::days(5), size);
        b.seats_booked = booked;
        b.refresh_cache();
        b
    }

    #[test]
    fn test_origin_price_fallback() {
        let trip = Trip::new("Hampta Pass", 12000, 16).with_origin_price("Delhi", 13500);
        assert_eq!(trip.price_for_origin(Some(" delhi ")), 13500);
        assert_eq!(trip.price_for_origin(Some("Manali")), 12000);
        assert_eq!(trip.price_for_origin(None), 12000);
    }

    #[test]
    fn test_reserve_and_release_roundtrip() {
        let mut b = batch(10, 4);
        b.try_reserve(3).unwrap();
        assert_eq!(b.seats_booked, 7);
        assert_eq!(b.available_seats, Some(3));

        b.release(3);
        assert_eq!(b.seats_booked, 4);
        assert_eq!(b.available_seats, Some(6));
    }

    #[test]
    fn test_reserve_beyond_capacity_leaves_batch_untouched() {
        let mut b = batch(10, 9);
        let before = b.clone();
        let err = b.try_reserve(2).unwrap_err();
        assert!(matches!(err, InventoryError::SeatsUnavailable { requested: 2, available: 1, .. }));
        assert_eq!(b.seats_booked, before.seats_booked);
        assert_eq!(b.available_seats, before.available_seats);
    }

    #[test]
    fn test_stale_cache_is_ignored() {
        let mut b = batch(10, 2);
        b.available_seats = Some(10);
        assert!(b.cache_is_stale());
        assert_eq!(b.remaining(), 8);

        b.available_seats = None;
        assert_eq!(b.remaining(), 8);
        b.try_reserve(1).unwrap();
        assert!(!b.cache_is_stale());
    }

    #[test]
    fn test_release_saturates_at_zero() {
        let mut b = batch(10, 1);
        b.release(5);
        assert_eq!(b.seats_booked, 0);
        assert_eq!(b.available_seats, Some(10));
    }

    #[test]
    fn test_closed_batch_rejects_reservation() {
        for status in [BatchStatus::Closed, BatchStatus::Completed] {
            let mut b = batch(10, 0);
            b.status = status;
            assert!(matches!(b.try_reserve(1), Err(InventoryError::BatchNotActive(_))));
            assert_eq!(b.seats_booked, 0);
        }
        assert_eq!("completed".parse::<BatchStatus>().unwrap(), BatchStatus::Completed);
    }

    #[test]
    fn test_override_bounds() {
        let mut b = batch(10, 3);
        assert!(b.override_booked(11).is_err());
        b.override_booked(10).unwrap();
        assert_eq!(b.available_seats, Some(0));
    }
}
