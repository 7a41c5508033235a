use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use yatra_booking::BookingError;
use yatra_catalog::InventoryError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    /// Request is well-formed but the booking is missing what it needs.
    UnprocessableError(String),
    /// A guard the caller can satisfy by resubmitting with confirmation.
    PreconditionError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnprocessableError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::PreconditionError(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let msg = err.to_string();
        match err {
            BookingError::NotFound(_)
            | BookingError::TripNotFound(_)
            | BookingError::BatchNotFound(_)
            | BookingError::RefundNotFound(_) => AppError::NotFoundError(msg),
            BookingError::SeatsUnavailable { .. }
            | BookingError::AlreadySettled { .. }
            | BookingError::InvalidTransition { .. }
            | BookingError::BatchNotActive(_)
            | BookingError::RefundAlreadyProcessed(_)
            | BookingError::Conflict(_) => AppError::ConflictError(msg),
            BookingError::MissingProof { .. } => AppError::UnprocessableError(msg),
            BookingError::Validation(_) => AppError::ValidationError(msg),
            BookingError::PolicyGuard { .. } => AppError::PreconditionError(msg),
            BookingError::Forbidden(_) => AppError::AuthorizationError(msg),
            BookingError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        BookingError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use yatra_booking::PaymentStage;

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_booking_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_of(BookingError::SeatsUnavailable {
                batch_id: id,
                requested: 2,
                available: 1
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BookingError::MissingProof {
                booking_id: id,
                stage: PaymentStage::Advance
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(BookingError::PolicyGuard {
                hours_to_departure: 20,
                window_hours: 48
            }),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(status_of(BookingError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BookingError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(BookingError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::Storage("pool timed out".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
