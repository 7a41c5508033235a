use uuid::Uuid;
use yatra_catalog::InventoryError;
use yatra_core::CoreError;

use crate::models::PaymentStage;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("Refund not found: {0}")]
    RefundNotFound(Uuid),

    #[error("Batch {0} is not open for booking")]
    BatchNotActive(Uuid),

    #[error("Only {available} seats left on batch {batch_id}, {requested} requested; pick another batch")]
    SeatsUnavailable {
        batch_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Booking {booking_id} has no uploaded {stage} proof to review")]
    MissingProof { booking_id: Uuid, stage: PaymentStage },

    #[error("Booking {booking_id} already has its {stage} payment settled")]
    AlreadySettled { booking_id: Uuid, stage: PaymentStage },

    #[error("Cannot apply {event} to a booking in state {from}")]
    InvalidTransition { from: String, event: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Departure is {hours_to_departure}h away (inside the {window_hours}h window); explicit confirmation required")]
    PolicyGuard { hours_to_departure: i64, window_hours: i64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Refund {0} has already been processed")]
    RefundAlreadyProcessed(Uuid),

    #[error("Booking {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<CoreError> for BookingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => BookingError::Validation(msg),
            CoreError::StorageFailure(msg) => BookingError::Storage(msg),
        }
    }
}

impl From<InventoryError> for BookingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(id) => BookingError::BatchNotFound(id),
            InventoryError::TripNotFound(id) => BookingError::TripNotFound(id),
            InventoryError::SeatsUnavailable {
                batch_id,
                requested,
                available,
            } => BookingError::SeatsUnavailable {
                batch_id,
                requested,
                available,
            },
            InventoryError::BatchNotActive(id) => BookingError::BatchNotActive(id),
            InventoryError::InvalidCount(msg) => BookingError::Validation(msg),
            InventoryError::Forbidden(msg) => BookingError::Forbidden(msg),
            InventoryError::Storage(e) => e.into(),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
