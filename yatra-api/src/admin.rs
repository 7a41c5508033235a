use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yatra_booking::{BalanceReminder, BookingError, CancelRequest, ManualPayment, Payment, Refund, ReviewDecision};
use yatra_catalog::{Batch, BatchStatus};
use yatra_core::Actor;

use crate::{bookings::BookingResponse, error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CancellationResponse {
    pub booking: BookingResponse,
    pub refund: Refund,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refund: Refund,
    pub booking: BookingResponse,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeatOverrideRequest {
    pub seats_booked: u32,
}

#[derive(Debug, Deserialize)]
pub struct BatchStatusRequest {
    pub status: BatchStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings/{id}/review", post(review_booking))
        .route("/v1/admin/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/admin/bookings/{id}/payments", post(record_payment))
        .route("/v1/admin/bookings/{id}/balance-reminder", post(send_balance_reminder))
        .route("/v1/admin/bookings/{id}", axum::routing::delete(delete_booking))
        .route("/v1/admin/refunds/{id}/process", post(process_refund))
        .route("/v1/admin/batches/{id}/seats", post(override_seats))
        .route("/v1/admin/batches/{id}/status", post(set_batch_status))
}

// ============================================================================
// Booking Handlers
// ============================================================================

/// POST /v1/admin/bookings/{id}/review
async fn review_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(decision): Json<ReviewDecision>,
) -> Result<Json<BookingResponse>, AppError> {
    let (stage, outcome) = (decision.stage, decision.outcome);
    match state.service.review(id, decision, &actor).await {
        Ok(booking) => {
            state.metrics.record_review(stage, outcome);
            Ok(Json(BookingResponse::from(&booking)))
        }
        Err(e) => {
            if matches!(e, BookingError::SeatsUnavailable { .. }) {
                state.metrics.record_seat_failure();
            }
            Err(e.into())
        }
    }
}

/// POST /v1/admin/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancellationResponse>, AppError> {
    let outcome = state.service.cancel(id, req, &actor, Utc::now()).await?;
    state.metrics.record_cancellation();

    Ok(Json(CancellationResponse {
        booking: BookingResponse::from(&outcome.booking),
        refund: outcome.refund,
    }))
}

/// POST /v1/admin/bookings/{id}/payments
async fn record_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payment): Json<ManualPayment>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state.service.record_manual_payment(id, payment, &actor).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /v1/admin/bookings/{id}/balance-reminder
async fn send_balance_reminder(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<BalanceReminder>, AppError> {
    Ok(Json(state.service.send_balance_reminder(id, &actor).await?))
}

/// DELETE /v1/admin/bookings/{id}[?hard=true]
async fn delete_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<Response, AppError> {
    if query.hard {
        state.service.hard_delete(id, &actor).await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let booking = state.service.soft_delete(id, &actor).await?;
    Ok(Json(BookingResponse::from(&booking)).into_response())
}

/// POST /v1/admin/refunds/{id}/process
async fn process_refund(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundResponse>, AppError> {
    let outcome = state.service.process_refund(id, &actor).await?;
    Ok(Json(RefundResponse {
        refund: outcome.refund,
        booking: BookingResponse::from(&outcome.booking),
    }))
}

// ============================================================================
// Inventory Handlers
// ============================================================================

/// POST /v1/admin/batches/{id}/seats
async fn override_seats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<SeatOverrideRequest>,
) -> Result<Json<Batch>, AppError> {
    let batch = state
        .service
        .inventory()
        .override_seats_booked(id, req.seats_booked, &actor)
        .await?;
    Ok(Json(batch))
}

/// POST /v1/admin/batches/{id}/status
async fn set_batch_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<BatchStatusRequest>,
) -> Result<Json<Batch>, AppError> {
    let batch = state.service.inventory().set_batch_status(id, req.status, &actor).await?;
    Ok(Json(batch))
}
