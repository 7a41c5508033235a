use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use yatra_booking::{BalanceReminder, Booking, BookingError, CancelRequest, ContactInfo, NewBooking, ProofUpload};
use yatra_core::Actor;
use yatra_shared::Masked;

use crate::{admin::CancellationResponse, error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trip_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub traveller_count: u32,
    pub total_amount: i64,
    pub pickup_location: Option<String>,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
}

/// Booking as exposed over HTTP. Contact details are left out.
#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub traveller_count: u32,
    pub total_amount: i64,
    pub advance_due: i64,
    pub advance_paid: i64,
    pub balance_paid: i64,
    pub booking_status: String,
    pub payment_status: String,
    pub advance_proof_status: String,
    pub balance_proof_status: String,
    pub seats_held: u32,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            trip_id: b.trip_id,
            batch_id: b.batch_id,
            traveller_count: b.traveller_count,
            total_amount: b.total_amount,
            advance_due: b.advance_due,
            advance_paid: b.advance_paid,
            balance_paid: b.balance_paid,
            booking_status: b.booking_status().as_str().to_string(),
            payment_status: b.payment_status().as_str().to_string(),
            advance_proof_status: b.advance_proof.status.as_str().to_string(),
            balance_proof_status: b.balance_proof.status.as_str().to_string(),
            seats_held: b.seats_held,
            cancellation_reason: b.cancellation_reason.clone(),
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/proofs", post(upload_proof))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/balance-reminder", get(balance_reminder))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let request = NewBooking {
        trip_id: req.trip_id,
        batch_id: req.batch_id,
        traveller_count: req.traveller_count,
        total_amount: req.total_amount,
        pickup_location: req.pickup_location,
        contact: ContactInfo {
            name: req.contact_name,
            phone: Masked::new(req.contact_phone),
            email: req.contact_email,
        },
    };

    let booking = match state.service.create_booking(request, &actor).await {
        Ok(booking) => booking,
        Err(e) => {
            if matches!(e, BookingError::SeatsUnavailable { .. }) {
                state.metrics.record_seat_failure();
            }
            return Err(e.into());
        }
    };

    info!("Booking {} created by {}", booking.id, actor.id);
    Ok((StatusCode::CREATED, Json(BookingResponse::from(&booking))))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.service.get_booking(id, &actor).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// POST /v1/bookings/{id}/proofs
async fn upload_proof(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(upload): Json<ProofUpload>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.service.upload_proof(id, upload, &actor).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// POST /v1/bookings/{id}/cancel
///
/// Owner-initiated cancellation. The late window cannot be confirmed from here.
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

/// GET /v1/bookings/{id}/balance-reminder
async fn balance_reminder(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<BalanceReminder>, AppError> {
    if !actor.is_staff() {
        return Err(AppError::AuthorizationError("balance reminders are staff only".to_string()));
    }
    Ok(Json(state.service.balance_reminder(id).await?))
}
