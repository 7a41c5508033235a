use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use yatra_booking::BatchOffer;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub pickup: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/trips/{trip_id}/batches", get(list_batches))
}

/// GET /v1/trips/{trip_id}/batches?pickup=
async fn list_batches(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<Vec<BatchOffer>>, AppError> {
    let offers = state
        .service
        .available_batches(trip_id, query.pickup.as_deref(), Utc::now())
        .await?;
    Ok(Json(offers))
}
