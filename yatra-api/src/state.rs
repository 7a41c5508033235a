use std::sync::Arc;
use yatra_booking::BookingService;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BookingService>,
    pub auth: AuthConfig,
    pub metrics: Arc<Metrics>,
}
