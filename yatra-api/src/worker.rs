use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use yatra_booking::{BookingRules, BookingService, ReconciliationFilter};

use crate::metrics::Metrics;

/// Periodic full-ledger reconciliation. Findings are reported, never fixed.
pub fn start_reconciliation_worker(
    service: Arc<BookingService>,
    metrics: Arc<Metrics>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Reconciliation worker started, every {:?}", every);

        loop {
            ticker.tick().await;
            run_reconciliation(&service, &metrics).await;
        }
    })
}

pub async fn run_reconciliation(service: &BookingService, metrics: &Metrics) {
    match service.reconciliation_report(&ReconciliationFilter::default()).await {
        Ok(report) => {
            metrics.set_mismatches(report.mismatches.len());
            for mismatch in &report.mismatches {
                warn!(
                    "Reconciliation mismatch on booking {}: {} ({})",
                    mismatch.booking_id,
                    mismatch.kind.as_str(),
                    mismatch.description
                );
            }
        }
        Err(e) => error!("Reconciliation sweep failed: {}", e),
    }
}

/// Moves stale initiated bookings to expired.
pub fn start_expiry_worker(service: Arc<BookingService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Expiry worker started, every {:?}", every);

        loop {
            ticker.tick().await;
            match service.expire_stale(Utc::now()).await {
                Ok(expired) if !expired.is_empty() => info!("Expired {} stale bookings", expired.len()),
                Ok(_) => {}
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }
    })
}

pub fn spawn_workers(service: Arc<BookingService>, metrics: Arc<Metrics>, rules: &BookingRules) {
    start_reconciliation_worker(
        service.clone(),
        metrics,
        Duration::from_secs(rules.reconciliation_interval_seconds.max(1)),
    );
    start_expiry_worker(service, Duration::from_secs(rules.expiry_interval_seconds.max(1)));
}
