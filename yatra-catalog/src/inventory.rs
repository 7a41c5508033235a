use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use yatra_core::{Actor, AuditAction, AuditEntityType, AuditLogEntry, AuditRepository, CoreError};

use crate::trip::{Batch, BatchStatus, Trip};

/// Storage for trips and the seat counters of their batches.
///
/// `reserve_seats` must be a single atomic check-and-increment at the storage
/// layer; callers never read-then-write seat counters themselves.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, CoreError>;

    async fn save_trip(&self, trip: &Trip) -> Result<(), CoreError>;

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, CoreError>;

    /// Insert a new batch or update its schedule fields. Seat counters of an
    /// existing batch are left alone.
    async fn save_batch(&self, batch: &Batch) -> Result<(), CoreError>;

    async fn list_batches(&self, trip_id: Uuid) -> Result<Vec<Batch>, CoreError>;

    async fn reserve_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError>;

    async fn release_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError>;

    async fn set_seats_booked(&self, batch_id: Uuid, seats_booked: u32) -> Result<Batch, InventoryError>;

    async fn set_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<Batch, InventoryError>;
}

/// Seat allocation for scheduled departures.
pub struct InventoryManager {
    repo: Arc<dyn BatchRepository>,
    audit: Arc<dyn AuditRepository>,
}

impl InventoryManager {
    pub fn new(repo: Arc<dyn BatchRepository>, audit: Arc<dyn AuditRepository>) -> Self {
        Self { repo, audit }
    }

    pub fn repository(&self) -> &Arc<dyn BatchRepository> {
        &self.repo
    }

    /// Schedule a new departure. Size defaults to the trip's capacity.
    pub async fn create_batch(
        &self,
        trip_id: Uuid,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        batch_size: Option<u32>,
    ) -> Result<Batch, InventoryError> {
        let trip = self
            .repo
            .get_trip(trip_id)
            .await?
            .ok_or(InventoryError::TripNotFound(trip_id))?;

        if end_date < start_date {
            return Err(InventoryError::InvalidCount("batch ends before it starts".to_string()));
        }

        let size = batch_size.unwrap_or(trip.default_capacity);
        if size == 0 {
            return Err(InventoryError::InvalidCount("batch size must be positive".to_string()));
        }

        let batch = Batch::new(trip_id, start_date, end_date, size);
        self.repo.save_batch(&batch).await?;
        info!("Batch {} scheduled for trip {} with {} seats", batch.id, trip_id, size);
        Ok(batch)
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> Result<Batch, InventoryError> {
        self.repo
            .get_batch(batch_id)
            .await?
            .ok_or(InventoryError::NotFound(batch_id))
    }

    /// Active departures of a trip, earliest first.
    pub async fn active_batches(&self, trip_id: Uuid) -> Result<Vec<Batch>, InventoryError> {
        let mut batches: Vec<Batch> = self
            .repo
            .list_batches(trip_id)
            .await?
            .into_iter()
            .filter(Batch::is_active)
            .collect();
        batches.sort_by_key(|b| b.start_date);
        Ok(batches)
    }

    /// Seats still open, recomputed from `seats_booked` rather than the cache.
    pub async fn available_seats(&self, batch_id: Uuid) -> Result<u32, InventoryError> {
        let batch = self.get_batch(batch_id).await?;
        if batch.cache_is_stale() {
            warn!(
                "Batch {} cache says {:?} seats, derived value is {}",
                batch_id,
                batch.available_seats,
                batch.remaining()
            );
        }
        Ok(batch.remaining())
    }

    pub async fn reserve_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
        if count == 0 {
            return Err(InventoryError::InvalidCount("seat count must be positive".to_string()));
        }
        match self.repo.reserve_seats(batch_id, count).await {
            Ok(batch) => {
                info!("Reserved {} seats on batch {} ({} left)", count, batch_id, batch.remaining());
                Ok(batch)
            }
            Err(e) => {
                warn!("Seat reservation on batch {} failed: {}", batch_id, e);
                Err(e)
            }
        }
    }

    pub async fn release_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
        let batch = self.repo.release_seats(batch_id, count).await?;
        info!("Released {} seats on batch {} ({} left)", count, batch_id, batch.remaining());
        Ok(batch)
    }

    /// Staff correction of a batch's booked counter.
    pub async fn override_seats_booked(
        &self,
        batch_id: Uuid,
        seats_booked: u32,
        actor: &Actor,
    ) -> Result<Batch, InventoryError> {
        if !actor.is_staff() {
            return Err(InventoryError::Forbidden("seat overrides require staff".to_string()));
        }
        let before = self.get_batch(batch_id).await?;
        let batch = self.repo.set_seats_booked(batch_id, seats_booked).await?;

        self.record(AuditLogEntry::new(
            actor,
            AuditAction::SeatsOverridden,
            AuditEntityType::Batch,
            batch_id,
            serde_json::json!({
                "seats_booked_before": before.seats_booked,
                "seats_booked_after": batch.seats_booked,
            }),
        ))
        .await;

        Ok(batch)
    }

    /// Close, complete or reopen a batch. Batches are never deleted.
    pub async fn set_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
        actor: &Actor,
    ) -> Result<Batch, InventoryError> {
        if !actor.is_staff() {
            return Err(InventoryError::Forbidden("batch status changes require staff".to_string()));
        }
        let batch = self.repo.set_batch_status(batch_id, status).await?;

        self.record(AuditLogEntry::new(
            actor,
            AuditAction::BatchStatusChanged,
            AuditEntityType::Batch,
            batch_id,
            serde_json::json!({ "status": status.as_str() }),
        ))
        .await;

        Ok(batch)
    }

    async fn record(&self, entry: AuditLogEntry) {
        if let Err(e) = self.audit.append(&entry).await {
            warn!("Failed to append audit entry {:?} for {}: {}", entry.action, entry.entity_id, e);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Batch not found: {0}")]
    NotFound(Uuid),

    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Seats unavailable on batch {batch_id}: requested {requested}, available {available}")]
    SeatsUnavailable {
        batch_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Batch is not open for booking: {0}")]
    BatchNotActive(Uuid),

    #[error("Invalid seat count: {0}")]
    InvalidCount(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Storage(#[from] CoreError),
}
