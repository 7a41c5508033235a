use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use yatra_booking::{PaymentStage, ReviewOutcome};

use crate::state::AppState;

/// Service counters, exported at `GET /metrics`.
pub struct Metrics {
    registry: Registry,
    /// Labels: `stage`, `outcome`
    verifications: IntCounterVec,
    seat_failures: IntCounter,
    cancellations: IntCounter,
    /// Mismatches found by the most recent reconciliation run.
    mismatches: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let verifications = IntCounterVec::new(
            Opts::new("yatra_payment_reviews_total", "Payment proof reviews by stage and outcome"),
            &["stage", "outcome"],
        )?;
        let seat_failures = IntCounter::new(
            "yatra_seat_reservation_failures_total",
            "Bookings turned away because the batch had too few seats",
        )?;
        let cancellations = IntCounter::new("yatra_cancellations_total", "Bookings cancelled by staff")?;
        let mismatches = IntGauge::new(
            "yatra_reconciliation_mismatches",
            "Mismatches found by the last reconciliation run",
        )?;

        registry.register(Box::new(verifications.clone()))?;
        registry.register(Box::new(seat_failures.clone()))?;
        registry.register(Box::new(cancellations.clone()))?;
        registry.register(Box::new(mismatches.clone()))?;

        Ok(Self {
            registry,
            verifications,
            seat_failures,
            cancellations,
            mismatches,
        })
    }

    pub fn record_review(&self, stage: PaymentStage, outcome: ReviewOutcome) {
        let outcome = match outcome {
            ReviewOutcome::Verified => "verified",
            ReviewOutcome::Rejected => "rejected",
        };
        self.verifications.with_label_values(&[stage.as_str(), outcome]).inc();
    }

    pub fn record_seat_failure(&self) {
        self.seat_failures.inc();
    }

    pub fn record_cancellation(&self) {
        self.cancellations.inc();
    }

    pub fn set_mismatches(&self, count: usize) {
        self.mismatches.set(count as i64);
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.export().map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_includes_labelled_reviews() {
        let metrics = Metrics::new().unwrap();
        metrics.record_review(PaymentStage::Advance, ReviewOutcome::Verified);
        metrics.record_seat_failure();
        metrics.set_mismatches(3);

        let text = metrics.export().unwrap();
        let review_line = text
            .lines()
            .find(|l| l.starts_with("yatra_payment_reviews_total{"))
            .unwrap();
        assert!(review_line.contains(r#"stage="advance""#));
        assert!(review_line.contains(r#"outcome="verified""#));
        assert!(review_line.ends_with(" 1"));
        assert!(text.contains("yatra_seat_reservation_failures_total 1"));
        assert!(text.contains("yatra_reconciliation_mismatches 3"));
    }
}
